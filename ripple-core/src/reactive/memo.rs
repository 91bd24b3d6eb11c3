//! Computed Field Implementation
//!
//! A computed field is a cached derived value attached to a container key.
//! It re-evaluates only when one of the fields it read last time changes,
//! and only when somebody reads it again.
//!
//! # How Computed Fields Work
//!
//! 1. The field starts dirty. The first read runs the derivation with the
//!    computed subscriber as the active context and caches the result.
//!
//! 2. When read again while clean, the cached value is returned without
//!    running anything.
//!
//! 3. When a dependency changes, the field is marked dirty and the
//!    notification is forwarded to whoever reads the field, so dependent
//!    computed fields turn dirty too and dependent reactions are queued.
//!    Nothing is recomputed at this point.
//!
//! 4. A field that is already dirty absorbs further notifications, which
//!    bounds recomputation to at most once per flush.
//!
//! 5. A failed recomputation drops the cached value. Until the next
//!    successful one, every dependency change is forwarded again, so
//!    readers that saw the error get another chance.
//!
//! # Cycles
//!
//! A derivation that reads its own field, directly or through other
//! computed fields, fails with [`ReactiveError::CycleDetected`] instead of
//! recursing.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{trace, warn};

use super::subscriber::{RunningGuard, Subscriber};
use crate::error::{BoxError, ReactiveError, Result};
use crate::store::{Container, Key, Value};

/// Dirty state of a computed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed. The next read recomputes.
    Dirty,
}

/// Derivation function of a computed field.
pub(crate) type Derive = Box<dyn Fn(&Container) -> Result<Value, BoxError>>;

pub(crate) struct Memo {
    key: Key,
    derive: Derive,
    value: RefCell<Option<Value>>,
    state: Cell<MemoState>,
    /// Set while the derivation runs.
    computing: Cell<bool>,
    subscriber: Rc<Subscriber>,
}

impl Memo {
    pub(crate) fn new(key: Key, derive: Derive, subscriber: Rc<Subscriber>) -> Self {
        Self {
            key,
            derive,
            value: RefCell::new(None),
            state: Cell::new(MemoState::Dirty),
            computing: Cell::new(false),
            subscriber,
        }
    }

    pub(crate) fn state(&self) -> MemoState {
        self.state.get()
    }

    pub(crate) fn recompute_count(&self) -> usize {
        self.subscriber.run_count()
    }

    /// Mark the field stale. Returns `true` if readers should hear about
    /// it: the field was clean, or its last recomputation failed.
    pub(crate) fn mark_dirty(&self) -> bool {
        let was_clean = self.state.replace(MemoState::Dirty) == MemoState::Clean;
        if was_clean {
            trace!(key = %self.key, "computed marked dirty");
        }
        was_clean || self.value.borrow().is_none()
    }

    pub(crate) fn dispose(&self) {
        self.subscriber.dispose();
    }

    /// Read the field through `container`, recomputing if necessary.
    ///
    /// The reader (the context active on entry) is registered as a
    /// dependent of the field.
    pub(crate) fn get(&self, container: &Container) -> Result<Value> {
        if self.computing.get() {
            warn!(key = %self.key, "computed field read itself");
            return Err(ReactiveError::CycleDetected {
                key: self.key.clone(),
            });
        }
        container.track(&self.key);

        if self.state.get() == MemoState::Clean {
            if let Some(value) = self.value.borrow().as_ref() {
                return Ok(value.clone());
            }
        }
        self.recompute(container)
    }

    fn recompute(&self, container: &Container) -> Result<Value> {
        let subscriber = &self.subscriber;
        subscriber.clear_dependencies();

        let result = {
            let _computing = ComputingGuard::enter(&self.computing);
            let _running = RunningGuard::enter(subscriber);
            let _ctx = container
                .runtime()
                .inner
                .context
                .enter(Some(subscriber.clone()));
            subscriber.record_run();
            (self.derive)(container)
        };

        let value = match result {
            Ok(value) => value,
            Err(err) => {
                let _stale = self.value.take();
                return Err(ReactiveError::from_callback(err, |source| {
                    ReactiveError::Derive {
                        key: self.key.clone(),
                        source,
                    }
                }));
            }
        };
        let value = container.lift(value);

        *self.value.borrow_mut() = Some(value.clone());
        self.state.set(MemoState::Clean);
        trace!(key = %self.key, runs = subscriber.run_count(), "computed recomputed");
        Ok(value)
    }
}

impl fmt::Debug for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("key", &self.key)
            .field("state", &self.state())
            .field("has_value", &self.value.borrow().is_some())
            .field("recompute_count", &self.recompute_count())
            .finish()
    }
}

struct ComputingGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> ComputingGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for ComputingGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}
