//! Reaction Implementation
//!
//! A Reaction is a side-effecting computation that re-runs whenever any
//! field it read during its previous run changes.
//!
//! # How Reactions Work
//!
//! 1. When created, the reaction runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the reaction is queued and, unless a
//!    batch is open, run before the triggering write returns.
//!
//! 3. Before re-running, the reaction is removed from every dependency
//!    record it joined last time and tracks new ones during execution, so
//!    its dependency set always reflects its most recent run.
//!
//! # Disposal
//!
//! [`Reaction::dispose`] is idempotent and takes effect even if the reaction
//! is already queued. Dropping the handle disposes as well; call
//! [`Reaction::detach`] to keep a reaction alive for the runtime's lifetime.
//!
//! # Error isolation
//!
//! By default an error returned by the callback surfaces to whoever caused
//! the run. A reaction created with [`ReactionOptions::on_error`] reports the
//! error to the handler instead, and sibling subscribers in the same flush
//! pass still run.

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::runtime::Runtime;
use super::subscriber::{Body, ErrorHandler, Job, Subscriber, SubscriberId, SubscriberKind};
use crate::error::{BoxError, ReactiveError, Result};

/// Options for [`Runtime::reaction_with`].
#[derive(Clone, Default)]
pub struct ReactionOptions {
    /// Shown in logs and in [`ReactiveError::Subscriber`].
    pub name: Option<String>,
    /// Isolate failures: report them here instead of propagating.
    pub on_error: Option<ErrorHandler>,
}

impl ReactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn on_error(mut self, handler: impl Fn(&ReactiveError) + 'static) -> Self {
        self.on_error = Some(Rc::new(handler));
        self
    }
}

impl fmt::Debug for ReactionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactionOptions")
            .field("name", &self.name)
            .field("isolated", &self.on_error.is_some())
            .finish()
    }
}

/// Handle to a running reaction.
///
/// # Example
///
/// ```rust
/// use ripple_core::{Data, Runtime};
///
/// let runtime = Runtime::new();
/// let state = runtime.wrap(&Data::from_fields([("count", 0)]));
///
/// let reaction = runtime.reaction({
///     let state = state.clone();
///     move || {
///         println!("count is {:?}", state.get("count")?);
///         Ok(())
///     }
/// })?;
///
/// state.set("count", 5)?; // prints: count is Number(5.0)
/// assert_eq!(reaction.run_count(), 2);
/// # Ok::<(), ripple_core::ReactiveError>(())
/// ```
pub struct Reaction {
    subscriber: Rc<Subscriber>,
    detached: bool,
}

impl Reaction {
    pub fn id(&self) -> SubscriberId {
        self.subscriber.id()
    }

    /// Stop the reaction. Safe to call more than once.
    pub fn dispose(&self) {
        self.subscriber.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.subscriber.is_disposed()
    }

    /// Number of times the callback has run.
    pub fn run_count(&self) -> usize {
        self.subscriber.run_count()
    }

    /// Number of fields read during the latest run.
    pub fn dependency_count(&self) -> usize {
        self.subscriber.dependency_count()
    }

    /// Keep the reaction alive for as long as its runtime, without a handle.
    ///
    /// The runtime owns detached reactions. A callback that captures a
    /// container or runtime handle therefore keeps the runtime alive too;
    /// call [`Runtime::release_detached`] to stop them and free it.
    ///
    /// [`Runtime::release_detached`]: crate::Runtime::release_detached
    pub fn detach(mut self) {
        self.detached = true;
        if let Some(runtime) = self.subscriber.runtime() {
            runtime
                .inner
                .detached
                .borrow_mut()
                .push(self.subscriber.clone());
        }
    }
}

impl Drop for Reaction {
    fn drop(&mut self) {
        if !self.detached {
            self.subscriber.dispose();
        }
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Runtime {
    /// Register `f` as a reaction and run it once immediately.
    ///
    /// If the first run fails the reaction is disposed and the error is
    /// returned.
    pub fn reaction<F>(&self, f: F) -> Result<Reaction>
    where
        F: Fn() -> Result<(), BoxError> + 'static,
    {
        self.reaction_with(ReactionOptions::default(), f)
    }

    pub fn reaction_with<F>(&self, options: ReactionOptions, f: F) -> Result<Reaction>
    where
        F: Fn() -> Result<(), BoxError> + 'static,
    {
        self.spawn(SubscriberKind::Reaction, Box::new(move |_| f()), options)
    }

    pub(crate) fn spawn(
        &self,
        kind: SubscriberKind,
        job: Job,
        options: ReactionOptions,
    ) -> Result<Reaction> {
        let subscriber = Subscriber::new(kind, self, Body::Job(job))
            .with_name(options.name)
            .with_error_handler(options.on_error);
        let reaction = Reaction {
            subscriber: Rc::new(subscriber),
            detached: false,
        };
        debug!(subscriber = %reaction.id(), ?kind, name = reaction.subscriber.name(), "created");

        self.run_subscriber(&reaction.subscriber)?;
        Ok(reaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Data;
    use std::cell::{Cell, RefCell};

    #[test]
    fn reaction_runs_on_creation() {
        let runtime = Runtime::new();
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();

        let reaction = runtime
            .reaction(move || {
                runs_clone.set(runs_clone.get() + 1);
                Ok(())
            })
            .unwrap();

        assert_eq!(runs.get(), 1);
        assert_eq!(reaction.run_count(), 1);
        assert_eq!(reaction.dependency_count(), 0);
    }

    #[test]
    fn reaction_reruns_on_change() {
        let runtime = Runtime::new();
        let state = runtime.wrap(&Data::from_fields([("count", 0)]));
        let seen = Rc::new(RefCell::new(Vec::new()));

        let reaction = runtime
            .reaction({
                let state = state.clone();
                let seen = seen.clone();
                move || {
                    seen.borrow_mut().push(state.get("count")?.as_f64());
                    Ok(())
                }
            })
            .unwrap();

        state.set("count", 1).unwrap();
        state.set("count", 2).unwrap();
        assert_eq!(*seen.borrow(), vec![Some(0.0), Some(1.0), Some(2.0)]);
        assert_eq!(reaction.dependency_count(), 1);
    }

    #[test]
    fn dropping_the_handle_disposes() {
        let runtime = Runtime::new();
        let state = runtime.wrap(&Data::from_fields([("count", 0)]));
        let runs = Rc::new(Cell::new(0));

        {
            let state = state.clone();
            let runs = runs.clone();
            let _reaction = runtime
                .reaction(move || {
                    state.get("count")?;
                    runs.set(runs.get() + 1);
                    Ok(())
                })
                .unwrap();
        }

        state.set("count", 1).unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn detached_reaction_keeps_running() {
        let runtime = Runtime::new();
        let state = runtime.wrap(&Data::from_fields([("count", 0)]));
        let runs = Rc::new(Cell::new(0));

        {
            let state = state.clone();
            let runs = runs.clone();
            runtime
                .reaction(move || {
                    state.get("count")?;
                    runs.set(runs.get() + 1);
                    Ok(())
                })
                .unwrap()
                .detach();
        }

        state.set("count", 1).unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn release_detached_frees_the_runtime() {
        let runtime = Runtime::new();
        let state = runtime.wrap(&Data::from_fields([("count", 0)]));
        let runs = Rc::new(Cell::new(0));
        let weak = Rc::downgrade(&runtime.inner);

        runtime
            .reaction({
                let state = state.clone();
                let runs = runs.clone();
                move || {
                    state.get("count")?;
                    runs.set(runs.get() + 1);
                    Ok(())
                }
            })
            .unwrap()
            .detach();

        assert_eq!(runtime.release_detached(), 1);
        assert_eq!(runtime.release_detached(), 0);
        state.set("count", 1).unwrap();
        assert_eq!(runs.get(), 1);

        drop(state);
        drop(runtime);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn failed_first_run_returns_error() {
        let runtime = Runtime::new();
        let err = runtime.reaction(|| Err("nope".into())).unwrap_err();
        assert!(matches!(err, ReactiveError::Subscriber { .. }));
        assert!(!runtime.is_tracking());
    }

    #[test]
    fn isolated_reaction_reports_instead_of_failing() {
        let runtime = Runtime::new();
        let reported = Rc::new(Cell::new(0));

        let options = ReactionOptions::new().named("flaky").on_error({
            let reported = reported.clone();
            move |err| {
                assert!(matches!(err, ReactiveError::Subscriber { name: Some(n), .. } if n == "flaky"));
                reported.set(reported.get() + 1);
            }
        });
        let reaction = runtime.reaction_with(options, || Err("nope".into())).unwrap();

        assert_eq!(reported.get(), 1);
        assert!(!reaction.is_disposed());
    }
}
