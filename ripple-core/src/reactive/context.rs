//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a container field is
//! read, we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! Each [`Runtime`] owns a stack of context entries. When a subscriber runs
//! (a reaction, a watcher, a computed recomputation) we push it onto the
//! stack, and the returned guard pops it when the run completes, whether it
//! returned normally, returned an error or unwound.
//!
//! [`Runtime::untrack`] pushes an empty entry: the previous top is hidden
//! rather than lost, and reappears once the untracked closure returns.
//!
//! This design supports nested reactive contexts (e.g., a computed field
//! that reads another computed field, or a reaction created inside another
//! reaction's run).

use std::cell::RefCell;
use std::rc::Rc;

use super::runtime::Runtime;
use super::subscriber::{Subscriber, SubscriberId};

/// An entry in the reactive context stack.
///
/// `None` marks an untracked region.
#[derive(Debug, Clone)]
struct ContextEntry {
    subscriber: Option<Rc<Subscriber>>,
}

/// The reactive context stack of one runtime.
#[derive(Debug, Default)]
pub(crate) struct ReactiveContext {
    stack: RefCell<Vec<ContextEntry>>,
}

impl ReactiveContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enter a new context. `None` suspends tracking.
    ///
    /// The context is exited when the returned guard is dropped.
    pub(crate) fn enter(&self, subscriber: Option<Rc<Subscriber>>) -> ContextGuard<'_> {
        let subscriber_id = subscriber.as_ref().map(|s| s.id());
        self.stack.borrow_mut().push(ContextEntry { subscriber });
        ContextGuard {
            context: self,
            subscriber_id,
        }
    }

    /// The subscriber reads are currently attributed to, if any.
    pub(crate) fn current(&self) -> Option<Rc<Subscriber>> {
        self.stack
            .borrow()
            .last()
            .and_then(|entry| entry.subscriber.clone())
    }

    /// Check if reads are currently being tracked.
    pub(crate) fn is_active(&self) -> bool {
        matches!(
            self.stack.borrow().last(),
            Some(ContextEntry {
                subscriber: Some(_)
            })
        )
    }

    /// Number of entries on the stack, untracked regions included.
    pub(crate) fn depth(&self) -> usize {
        self.stack.borrow().len()
    }
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation fails or panics.
pub(crate) struct ContextGuard<'a> {
    context: &'a ReactiveContext,
    subscriber_id: Option<SubscriberId>,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let popped = self.context.stack.borrow_mut().pop();

        // Verify we're popping the right context.
        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.subscriber.as_ref().map(|s| s.id()),
                self.subscriber_id,
                "ReactiveContext mismatch"
            );
        }
    }
}

impl Runtime {
    /// Run `f` with dependency collection suspended.
    ///
    /// Reads inside `f` register no dependency for the enclosing subscriber.
    /// The previous context is restored when `f` returns or unwinds.
    pub fn untrack<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.inner.context.enter(None);
        f()
    }

    /// The subscriber reads are currently attributed to, if any.
    pub fn current_subscriber(&self) -> Option<SubscriberId> {
        self.inner.context.current().map(|s| s.id())
    }

    /// Check if reads are currently being tracked.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::subscriber::{Body, SubscriberKind};

    fn subscriber(runtime: &Runtime) -> Rc<Subscriber> {
        Rc::new(Subscriber::new(
            SubscriberKind::Reaction,
            runtime,
            Body::Job(Box::new(|_| Ok(()))),
        ))
    }

    #[test]
    fn context_tracks_subscriber() {
        let runtime = Runtime::new();
        let sub = subscriber(&runtime);

        assert!(!runtime.is_tracking());
        assert!(runtime.current_subscriber().is_none());

        {
            let _ctx = runtime.inner.context.enter(Some(sub.clone()));

            assert!(runtime.is_tracking());
            assert_eq!(runtime.current_subscriber(), Some(sub.id()));
        }

        // Context should be cleaned up after drop
        assert!(!runtime.is_tracking());
        assert_eq!(runtime.inner.context.depth(), 0);
    }

    #[test]
    fn nested_contexts() {
        let runtime = Runtime::new();
        let outer = subscriber(&runtime);
        let inner = subscriber(&runtime);

        {
            let _ctx1 = runtime.inner.context.enter(Some(outer.clone()));
            assert_eq!(runtime.current_subscriber(), Some(outer.id()));

            {
                let _ctx2 = runtime.inner.context.enter(Some(inner.clone()));
                assert_eq!(runtime.current_subscriber(), Some(inner.id()));
            }

            // After inner context drops, outer should be current
            assert_eq!(runtime.current_subscriber(), Some(outer.id()));
        }

        assert!(runtime.current_subscriber().is_none());
    }

    #[test]
    fn untrack_hides_and_restores_current() {
        let runtime = Runtime::new();
        let sub = subscriber(&runtime);
        let _ctx = runtime.inner.context.enter(Some(sub.clone()));

        let inside = runtime.untrack(|| (runtime.is_tracking(), runtime.current_subscriber()));
        assert_eq!(inside, (false, None));
        assert_eq!(runtime.current_subscriber(), Some(sub.id()));
    }

    #[test]
    fn untrack_restores_after_panic() {
        let runtime = Runtime::new();
        let sub = subscriber(&runtime);
        let _ctx = runtime.inner.context.enter(Some(sub.clone()));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            runtime.untrack(|| panic!("intentional panic"));
        }));

        assert!(result.is_err());
        assert_eq!(runtime.current_subscriber(), Some(sub.id()));
        assert_eq!(runtime.inner.context.depth(), 1);
    }
}
