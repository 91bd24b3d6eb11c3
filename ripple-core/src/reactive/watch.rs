//! Watchers.
//!
//! A watcher re-reads a target whenever the target's dependencies change and
//! calls its callback with `(new, old)` only if the value differs by strict
//! equality. The stored previous value is updated on every run, whether or
//! not the callback fired. Callbacks run untracked, so whatever they read
//! does not become a dependency of the watcher.

use std::cell::RefCell;
use std::fmt;

use super::effect::{Reaction, ReactionOptions};
use super::runtime::Runtime;
use super::subscriber::{Job, SubscriberId, SubscriberKind};
use crate::error::{BoxError, ReactiveError, Result};
use crate::store::Value;

/// Options for [`Runtime::watch`].
#[derive(Clone, Default)]
pub struct WatchOptions {
    /// Fire the callback once on creation, with `Value::Null` as the old value.
    pub immediate: bool,
    pub reaction: ReactionOptions,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.reaction = self.reaction.named(name);
        self
    }

    pub fn on_error(mut self, handler: impl Fn(&ReactiveError) + 'static) -> Self {
        self.reaction = self.reaction.on_error(handler);
        self
    }
}

impl fmt::Debug for WatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchOptions")
            .field("immediate", &self.immediate)
            .field("reaction", &self.reaction)
            .finish()
    }
}

/// Handle to a watcher. Dropping it stops the watcher.
#[derive(Debug)]
pub struct Watcher {
    reaction: Reaction,
}

impl Watcher {
    pub fn id(&self) -> SubscriberId {
        self.reaction.id()
    }

    pub fn dispose(&self) {
        self.reaction.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.reaction.is_disposed()
    }

    /// Number of times the target was re-read.
    pub fn run_count(&self) -> usize {
        self.reaction.run_count()
    }

    pub fn detach(self) {
        self.reaction.detach();
    }
}

impl Runtime {
    /// Watch the value produced by `getter`.
    pub fn watch<G, C>(&self, getter: G, callback: C, options: WatchOptions) -> Result<Watcher>
    where
        G: Fn() -> Result<Value, BoxError> + 'static,
        C: Fn(&Value, &Value) -> Result<(), BoxError> + 'static,
    {
        let immediate = options.immediate;
        let previous: RefCell<Option<Value>> = RefCell::new(None);

        let job: Job = Box::new(move |runtime| {
            let next = getter()?;
            let old = previous.replace(Some(next.clone()));
            let changed = match &old {
                Some(old) => *old != next,
                None => immediate,
            };
            if changed {
                let old = old.unwrap_or(Value::Null);
                runtime.untrack(|| callback(&next, &old))?;
            }
            Ok(())
        });

        self.spawn(SubscriberKind::Watcher, job, options.reaction)
            .map(|reaction| Watcher { reaction })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Data;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<(Value, Value)>>>;

    fn recorder(log: &Log) -> impl Fn(&Value, &Value) -> Result<(), BoxError> + 'static {
        let log = log.clone();
        move |new, old| {
            log.borrow_mut().push((new.clone(), old.clone()));
            Ok(())
        }
    }

    #[test]
    fn fires_only_on_change() {
        let runtime = Runtime::new();
        let state = runtime.wrap(&Data::from_fields([("count", 0)]));
        let log: Log = Rc::default();

        let _watcher = state.watch("count", recorder(&log)).unwrap();
        assert!(log.borrow().is_empty());

        state.set("count", 1).unwrap();
        state.set("count", 1).unwrap();
        state.notify(Some("count".into())).unwrap();

        assert_eq!(*log.borrow(), vec![(Value::from(1), Value::from(0))]);
    }

    #[test]
    fn immediate_fires_on_creation() {
        let runtime = Runtime::new();
        let state = runtime.wrap(&Data::from_fields([("name", "ada")]));
        let log: Log = Rc::default();

        let getter = {
            let state = state.clone();
            move || -> Result<Value, BoxError> { Ok(state.get("name")?) }
        };
        let _watcher = runtime
            .watch(getter, recorder(&log), WatchOptions::new().immediate())
            .unwrap();

        assert_eq!(*log.borrow(), vec![(Value::from("ada"), Value::Null)]);
    }

    #[test]
    fn previous_value_tracks_every_run() {
        let runtime = Runtime::new();
        let state = runtime.wrap(&Data::from_fields([("a", 1), ("b", 1)]));
        let log: Log = Rc::default();

        // Watches a + b; changing both in opposite directions keeps the sum.
        let getter = {
            let state = state.clone();
            move || -> Result<Value, BoxError> {
                let a = state.get("a")?.as_f64().unwrap_or_default();
                let b = state.get("b")?.as_f64().unwrap_or_default();
                Ok(Value::from(a + b))
            }
        };
        let watcher = runtime
            .watch(getter, recorder(&log), WatchOptions::default())
            .unwrap();

        runtime
            .batch(|| {
                state.set("a", 2).unwrap();
                state.set("b", 0).unwrap();
            })
            .unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(watcher.run_count(), 2);

        state.set("a", 5).unwrap();
        assert_eq!(*log.borrow(), vec![(Value::from(5), Value::from(2))]);
    }

    #[test]
    fn callback_reads_are_untracked() {
        let runtime = Runtime::new();
        let state = runtime.wrap(&Data::from_fields([("count", 0), ("other", 0)]));
        let fired = Rc::new(std::cell::Cell::new(0));

        let watcher = state
            .watch("count", {
                let state = state.clone();
                let fired = fired.clone();
                move |_, _| {
                    state.get("other")?;
                    fired.set(fired.get() + 1);
                    Ok(())
                }
            })
            .unwrap();

        state.set("count", 1).unwrap();
        assert_eq!(fired.get(), 1);

        state.set("other", 1).unwrap();
        assert_eq!(watcher.run_count(), 2);
    }
}
