//! Subscriber types for the reactive system.
//!
//! A Subscriber represents any computation whose reads are attributed to it
//! while it runs: reactions, watchers and computed fields. Each subscriber
//! remembers the dependency records it registered itself in during its most
//! recent run, so the next run (or disposal) can remove it from all of them
//! before collecting a fresh set.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use tracing::debug;

use super::dep::DepRecord;
use super::runtime::{Runtime, RuntimeInner};
use crate::error::{BoxError, ReactiveError};
use crate::store::{DataInner, Key};

/// Unique identifier for a subscriber.
///
/// Each subscriber (reaction, watcher or computed field) gets a unique ID
/// when created. Dependency records and the pending queue deduplicate by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter so IDs stay unique across runtimes.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The three subscriber variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberKind {
    /// Re-runs on every notification.
    Reaction,
    /// Re-reads its target on notification and fires only on change.
    Watcher,
    /// Marks itself dirty on notification and recomputes on the next read.
    Computed,
}

/// Handler invoked with the error of an isolated subscriber.
pub type ErrorHandler = Rc<dyn Fn(&ReactiveError)>;

/// Callback run by reactions and watchers.
pub(crate) type Job = Box<dyn Fn(&Runtime) -> Result<(), BoxError>>;

/// What a subscriber does when it is notified.
pub(crate) enum Body {
    /// Queued and run (reactions, watchers).
    Job(Job),
    /// Marked dirty in place; `key` names the computed field on `source`.
    Computed { source: Weak<DataInner>, key: Key },
}

/// A subscriber to reactive values.
pub(crate) struct Subscriber {
    id: SubscriberId,
    kind: SubscriberKind,
    name: Option<String>,
    runtime: Weak<RuntimeInner>,
    body: Body,
    on_error: Option<ErrorHandler>,
    disposed: Cell<bool>,
    running: Cell<bool>,
    run_count: Cell<usize>,
    /// Records this subscriber registered in during its latest run.
    deps: RefCell<SmallVec<[Rc<DepRecord>; 4]>>,
}

impl Subscriber {
    pub(crate) fn new(kind: SubscriberKind, runtime: &Runtime, body: Body) -> Self {
        Self {
            id: SubscriberId::new(),
            kind,
            name: None,
            runtime: Rc::downgrade(&runtime.inner),
            body,
            on_error: None,
            disposed: Cell::new(false),
            running: Cell::new(false),
            run_count: Cell::new(0),
            deps: RefCell::new(SmallVec::new()),
        }
    }

    pub(crate) fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub(crate) fn with_error_handler(mut self, handler: Option<ErrorHandler>) -> Self {
        self.on_error = handler;
        self
    }

    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn kind(&self) -> SubscriberKind {
        self.kind
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn body(&self) -> &Body {
        &self.body
    }

    pub(crate) fn error_handler(&self) -> Option<&ErrorHandler> {
        self.on_error.as_ref()
    }

    /// The runtime this subscriber belongs to, if it is still alive.
    pub(crate) fn runtime(&self) -> Option<Runtime> {
        self.runtime.upgrade().map(|inner| Runtime { inner })
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.get()
    }

    pub(crate) fn run_count(&self) -> usize {
        self.run_count.get()
    }

    pub(crate) fn record_run(&self) {
        self.run_count.set(self.run_count.get() + 1);
    }

    pub(crate) fn dependency_count(&self) -> usize {
        self.deps.borrow().len()
    }

    /// Remember a record this subscriber was added to during the current run.
    pub(crate) fn add_dependency(&self, record: Rc<DepRecord>) {
        self.deps.borrow_mut().push(record);
    }

    /// Remove this subscriber from every record it is registered in.
    pub(crate) fn clear_dependencies(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for record in deps {
            record.remove(self.id);
        }
    }

    /// Dispose the subscriber. Returns `false` if it was already disposed.
    pub(crate) fn dispose(&self) -> bool {
        if self.disposed.replace(true) {
            return false;
        }
        self.clear_dependencies();
        debug!(subscriber = %self.id, kind = ?self.kind(), "disposed");
        true
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("disposed", &self.is_disposed())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Marks a subscriber as running for the lifetime of the guard.
pub(crate) struct RunningGuard<'a> {
    subscriber: &'a Subscriber,
}

impl<'a> RunningGuard<'a> {
    pub(crate) fn enter(subscriber: &'a Subscriber) -> Self {
        subscriber.running.set(true);
        Self { subscriber }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.subscriber.running.set(false);
    }
}
