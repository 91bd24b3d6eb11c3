//! Ripple Core
//!
//! A fine-grained reactive dependency-tracking engine for plain data.
//!
//! Wrap a record or list in a [`Container`] and every read made while a
//! subscriber runs is recorded against that subscriber. When a field is
//! written, exactly the subscribers that read it are invoked again. There is
//! no manual subscribe or unsubscribe bookkeeping.
//!
//! It provides:
//!
//! - Reactive containers over records and lists, with lazy wrapping of
//!   nested data
//! - Reactions, watchers and lazily recomputed computed fields
//! - Batching with deduplicated, ordered flushes
//! - Untracked reads and manual notification
//!
//! # Architecture
//!
//! - `store`: keys, values, plain [`Data`] and the observed [`Container`]
//! - `reactive`: the [`Runtime`], subscribers, dependency records, batching
//! - `config`: runtime tunables
//! - `error`: the crate's error type
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{Data, Runtime, Value};
//!
//! let runtime = Runtime::new();
//! let state = runtime.wrap(&Data::from_fields([("count", 0)]));
//! state.define_computed("doubled", |s| {
//!     Ok(Value::from(s.get("count")?.as_f64().unwrap_or_default() * 2.0))
//! })?;
//!
//! let effect = runtime.reaction({
//!     let state = state.clone();
//!     move || {
//!         println!("count: {:?}, doubled: {:?}", state.get("count")?, state.get("doubled")?);
//!         Ok(())
//!     }
//! })?;
//!
//! state.set("count", 5)?;
//! assert_eq!(effect.run_count(), 2);
//! # Ok::<(), ripple_core::ReactiveError>(())
//! ```
//!
//! # Threading
//!
//! Runtimes, containers and data are single-threaded (`!Send`). Independent
//! runtimes never share state.

pub mod config;
pub mod error;
pub mod reactive;
pub mod store;

pub use config::RuntimeConfig;
pub use error::{BoxError, ReactiveError, Result};
pub use reactive::{
    MemoState, Reaction, ReactionOptions, Runtime, SubscriberId, SubscriberKind, WatchOptions,
    Watcher,
};
pub use store::{Container, Data, Key, Shape, Update, Value};
