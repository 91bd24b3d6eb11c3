//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects containers,
//! reactions, watchers and computed fields. It owns the context stack and
//! the batch state, and it decides what happens to a subscriber when one of
//! its dependencies changes.
//!
//! # How It Works
//!
//! 1. When a subscriber runs, the runtime pushes it onto the context stack;
//!    every container read during the run registers it in that field's
//!    dependency record.
//!
//! 2. When a field changes, the container hands the field's record to
//!    [`notify_records`], which:
//!    a. Collects the record's live subscribers (pruning stale ones)
//!    b. Marks computed subscribers dirty and forwards the notification to
//!       whoever reads the computed field
//!    c. Queues reactions and watchers on their runtime
//!    d. Flushes every touched runtime that is not batching or flushing
//!
//! 3. Computed fields are lazy - they recompute on next read.
//!
//! # Instances
//!
//! Runtimes are independent: each has its own context stack, batch depth
//! and pending queue. A [`Runtime`] is a cheap, clonable handle.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::batch::BatchState;
use super::context::ReactiveContext;
use super::dep::DepRecord;
use super::subscriber::{Body, RunningGuard, Subscriber};
use crate::config::RuntimeConfig;
use crate::error::{ReactiveError, Result};
use crate::store::{Container, Data, Key};

/// Handle to a reactive engine instance.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) context: ReactiveContext,
    pub(crate) batch: BatchState,
    /// Subscribers kept alive after their handle was detached.
    pub(crate) detached: RefCell<Vec<Rc<Subscriber>>>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                context: ReactiveContext::new(),
                batch: BatchState::new(),
                detached: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Returns `true` if both handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Wrap plain data in a reactive container.
    ///
    /// Idempotent: wrapping the same `Data` twice yields equal containers
    /// that share dependency records.
    pub fn wrap(&self, data: &Data) -> Container {
        Container::new(self.clone(), data.clone())
    }

    /// Build data from JSON and wrap it. The root must be an object or array.
    pub fn wrap_json(&self, json: serde_json::Value) -> Result<Container> {
        Data::from_json(json)
            .map(|data| self.wrap(&data))
            .ok_or(ReactiveError::ShapeMismatch {
                expected: "record or list",
            })
    }

    /// Returns `true` if `data` has been wrapped by any runtime.
    pub fn is_reactive(&self, data: &Data) -> bool {
        data.is_reactive()
    }

    /// Notify the subscribers of `key` on `data` (every key if `None`)
    /// without requiring a value change.
    ///
    /// Data that was never read inside a tracked run has no subscribers, so
    /// this is a no-op for it.
    pub fn notify_data(&self, data: &Data, key: Option<&Key>) -> Result<()> {
        notify_records(&data.records(key))
    }

    /// Dispose and drop every detached reaction. Returns how many there
    /// were.
    pub fn release_detached(&self) -> usize {
        let detached = std::mem::take(&mut *self.inner.detached.borrow_mut());
        for subscriber in &detached {
            subscriber.dispose();
        }
        debug!(released = detached.len(), "released detached reactions");
        detached.len()
    }

    /// Register the current subscriber, if any, in `record`.
    pub(crate) fn track(&self, record: &Rc<DepRecord>) {
        let Some(subscriber) = self.inner.context.current() else {
            return;
        };
        if subscriber.is_disposed() {
            return;
        }
        if record.add(&subscriber) {
            trace!(subscriber = %subscriber.id(), key = %record.key(), "tracked read");
            subscriber.add_dependency(record.clone());
        }
    }

    /// Run a reaction or watcher now, replacing its dependency set.
    ///
    /// Errors from subscribers created with an error handler are reported
    /// to the handler and swallowed.
    pub(crate) fn run_subscriber(&self, subscriber: &Rc<Subscriber>) -> Result<()> {
        if subscriber.is_disposed() {
            return Ok(());
        }
        let Body::Job(job) = subscriber.body() else {
            return Ok(());
        };

        subscriber.clear_dependencies();
        let outcome = {
            let _running = RunningGuard::enter(subscriber);
            let _ctx = self.inner.context.enter(Some(subscriber.clone()));
            subscriber.record_run();
            job(self)
        };

        let Err(err) = outcome else {
            return Ok(());
        };
        let err = ReactiveError::from_callback(err, |source| ReactiveError::Subscriber {
            subscriber: subscriber.id(),
            name: subscriber.name().map(str::to_owned),
            source,
        });
        match subscriber.error_handler() {
            Some(handler) => {
                warn!(subscriber = %subscriber.id(), error = %err, "isolated subscriber failed");
                handler(&err);
                Ok(())
            }
            None => Err(err),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("depth", &self.depth())
            .field("pending", &self.pending_count())
            .field("tracking", &self.is_tracking())
            .field("context_depth", &self.inner.context.depth())
            .finish()
    }
}

/// Fan a change out to every subscriber of `records`, then flush the
/// runtimes that received work, unless they are batching or already flushing.
pub(crate) fn notify_records(records: &[Rc<DepRecord>]) -> Result<()> {
    let mut touched: SmallVec<[Runtime; 1]> = SmallVec::new();
    for record in records {
        fan_out(record, &mut touched);
    }
    for runtime in touched {
        runtime.flush_if_idle()?;
    }
    Ok(())
}

fn fan_out(record: &DepRecord, touched: &mut SmallVec<[Runtime; 1]>) {
    let subscribers = record.live();
    if subscribers.is_empty() {
        return;
    }
    trace!(key = %record.key(), subscribers = subscribers.len(), "notify");
    for subscriber in subscribers {
        schedule(&subscriber, touched);
    }
}

fn schedule(subscriber: &Rc<Subscriber>, touched: &mut SmallVec<[Runtime; 1]>) {
    match subscriber.body() {
        Body::Computed { source, key } => {
            // Push dirtiness, pull values: only the first notification after
            // a successful recomputation travels further.
            let Some(data) = source.upgrade().map(Data::from_inner) else {
                return;
            };
            let Some(memo) = data.memo(key) else {
                return;
            };
            if memo.mark_dirty() {
                if let Some(record) = data.existing_record(key) {
                    fan_out(&record, touched);
                }
            }
        }
        Body::Job(_) => {
            if subscriber.is_running() {
                trace!(subscriber = %subscriber.id(), "skipping self-notification");
                return;
            }
            let Some(runtime) = subscriber.runtime() else {
                return;
            };
            runtime.inner.batch.enqueue(subscriber.clone());
            if !touched.iter().any(|r| r.ptr_eq(&runtime)) {
                touched.push(runtime);
            }
        }
    }
}
