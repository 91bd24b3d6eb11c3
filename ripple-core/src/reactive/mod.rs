//! Reactive Engine
//!
//! This module implements dependency tracking and change propagation for
//! [`Container`](crate::Container)s: reactions, watchers, computed fields,
//! the per-runtime context stack and batching.
//!
//! # Concepts
//!
//! ## Reactions
//!
//! A Reaction is a side-effecting computation. It runs once on creation and
//! again whenever a field it read during its latest run changes.
//!
//! ## Watchers
//!
//! A Watcher re-reads a single target on change and calls its callback with
//! the new and previous value, only if they differ.
//!
//! ## Computed fields
//!
//! A computed field is a derived value attached to a container key. It
//! caches its result, turns dirty when a dependency changes and recomputes
//! lazily on the next read.
//!
//! # Invariants
//!
//! 1. A subscriber's dependencies are exactly the fields it read during its
//!    most recent run.
//! 2. Disposed subscribers are never invoked again, even if already queued.
//! 3. Within one flush every queued subscriber runs at most once, in
//!    first-enqueued order.
//! 4. The context stack and batch depth are restored on every exit path,
//!    including errors and panics.
//!
//! # Implementation Notes
//!
//! Every [`Runtime`] owns its own context stack: when a container field is
//! read, the runtime checks whether a subscriber is on top of the stack and,
//! if so, registers it in the field's dependency record.

mod batch;
mod context;
pub(crate) mod dep;
mod effect;
pub(crate) mod memo;
pub(crate) mod runtime;
pub(crate) mod subscriber;
mod watch;

pub use effect::{Reaction, ReactionOptions};
pub use memo::MemoState;
pub use runtime::Runtime;
pub use subscriber::{ErrorHandler, SubscriberId, SubscriberKind};
pub use watch::{WatchOptions, Watcher};
