//! Batching
//!
//! Group multiple writes into a single reaction cycle.
//!
//! A runtime keeps one depth counter and one deduplicated pending queue.
//! While the depth is above zero, notified reactions and watchers are only
//! queued. The queue drains when the depth returns to zero, either because
//! the outermost [`Runtime::batch`] returned or because [`Runtime::resume`]
//! was asked to flush.
//!
//! # Flush passes
//!
//! A drain runs in passes. Each pass takes the queue as it stands, runs each
//! subscriber once in first-enqueued order, and leaves anything queued in
//! the meantime for the next pass. Subscribers notified by a running pass
//! never start a nested drain. The number of passes is capped by
//! [`RuntimeConfig::max_flush_passes`] to stop notify loops.
//!
//! # Failures
//!
//! A subscriber error that is not isolated aborts the drain: the rest of
//! the pass and anything queued since are dropped, and the error goes to
//! whoever triggered the flush. Dropped subscribers keep the dependencies of
//! their last run, so the next change to a field they read runs them again.
//! Nothing is left queued for an unrelated later write to pick up.
//!
//! [`RuntimeConfig::max_flush_passes`]: crate::RuntimeConfig::max_flush_passes

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::runtime::Runtime;
use super::subscriber::{Subscriber, SubscriberId};
use crate::error::{ReactiveError, Result};

pub(crate) struct BatchState {
    depth: Cell<usize>,
    pending: RefCell<IndexMap<SubscriberId, Rc<Subscriber>>>,
    flushing: Cell<bool>,
}

impl BatchState {
    pub(crate) fn new() -> Self {
        Self {
            depth: Cell::new(0),
            pending: RefCell::new(IndexMap::new()),
            flushing: Cell::new(false),
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth.get()
    }

    pub(crate) fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    fn enter(&self) -> usize {
        let depth = self.depth.get() + 1;
        self.depth.set(depth);
        depth
    }

    /// Decrement the depth, clamped at zero. Returns the new depth and
    /// whether the call had nothing to decrement.
    fn exit(&self) -> (usize, bool) {
        match self.depth.get() {
            0 => (0, true),
            depth => {
                self.depth.set(depth - 1);
                (depth - 1, false)
            }
        }
    }

    /// Queue a subscriber. A subscriber already waiting keeps its position.
    pub(crate) fn enqueue(&self, subscriber: Rc<Subscriber>) -> bool {
        let mut pending = self.pending.borrow_mut();
        if pending.contains_key(&subscriber.id()) {
            return false;
        }
        pending.insert(subscriber.id(), subscriber);
        true
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    fn take_pending(&self) -> Vec<Rc<Subscriber>> {
        std::mem::take(&mut *self.pending.borrow_mut())
            .into_values()
            .collect()
    }

    /// Drop everything still queued. Returns how many subscribers were
    /// dropped.
    fn clear(&self) -> usize {
        let mut pending = self.pending.borrow_mut();
        let dropped = pending.len();
        pending.clear();
        dropped
    }
}

/// Holds one level of batch depth; releases it on drop, including unwinds.
struct BatchGuard<'a> {
    state: &'a BatchState,
}

impl<'a> BatchGuard<'a> {
    fn enter(state: &'a BatchState) -> Self {
        state.enter();
        Self { state }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.state.exit();
    }
}

struct FlushGuard<'a> {
    state: &'a BatchState,
}

impl<'a> FlushGuard<'a> {
    fn enter(state: &'a BatchState) -> Self {
        state.flushing.set(true);
        Self { state }
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.state.flushing.set(false);
    }
}

impl Runtime {
    /// Run `f` with notifications deferred until it returns.
    ///
    /// Subscribers notified inside `f` run once each after the outermost
    /// batch (or pause) ends, observing the final state. Returns `f`'s
    /// result, or the first error raised while flushing.
    ///
    /// If `f` panics the depth is still released, and the queued work waits
    /// for the next flush.
    pub fn batch<T>(&self, f: impl FnOnce() -> T) -> Result<T> {
        let value = {
            let _guard = BatchGuard::enter(&self.inner.batch);
            f()
        };
        self.flush_if_idle()?;
        Ok(value)
    }

    /// Start an unscoped batch. Never flushes.
    pub fn pause(&self) {
        let depth = self.inner.batch.enter();
        debug!(depth, "paused");
    }

    /// End an unscoped batch.
    ///
    /// The depth never goes below zero. When `flush` is set and the depth is
    /// now zero the pending queue drains; otherwise it stays queued.
    pub fn resume(&self, flush: bool) -> Result<()> {
        let (depth, underflow) = self.inner.batch.exit();
        if underflow && self.inner.config.warn_on_unbalanced_resume {
            warn!("resume called without a matching pause");
        }
        debug!(depth, flush, "resumed");
        if flush && depth == 0 {
            self.drain()?;
        }
        Ok(())
    }

    /// Drain the pending queue now, unless a batch is open.
    pub fn flush(&self) -> Result<()> {
        self.flush_if_idle()
    }

    /// Current batch depth.
    pub fn depth(&self) -> usize {
        self.inner.batch.depth()
    }

    /// Check if notifications are currently deferred.
    pub fn is_batching(&self) -> bool {
        self.inner.batch.depth() > 0
    }

    /// Number of subscribers waiting for the next flush.
    pub fn pending_count(&self) -> usize {
        self.inner.batch.pending_len()
    }

    pub(crate) fn flush_if_idle(&self) -> Result<()> {
        if self.inner.batch.depth() == 0 {
            self.drain()
        } else {
            Ok(())
        }
    }

    fn drain(&self) -> Result<()> {
        let state = &self.inner.batch;
        if state.is_flushing() {
            // The running drain picks new work up in its next pass.
            return Ok(());
        }
        let _flushing = FlushGuard::enter(state);
        let limit = self.inner.config.flush_pass_limit();
        let mut passes = 0;

        loop {
            let pass = state.take_pending();
            if pass.is_empty() {
                return Ok(());
            }
            passes += 1;
            if passes > limit {
                let dropped = pass.len() + state.clear();
                warn!(passes = limit, dropped, "flush did not settle");
                return Err(ReactiveError::CascadeLimit { passes: limit });
            }
            debug!(pass = passes, subscribers = pass.len(), "flush pass");

            let mut queue = pass.into_iter();
            while let Some(subscriber) = queue.next() {
                if let Err(err) = self.run_subscriber(&subscriber) {
                    let dropped = queue.len() + state.clear();
                    if dropped > 0 {
                        warn!(subscriber = %subscriber.id(), dropped, "flush aborted");
                    }
                    return Err(err);
                }
            }
        }
    }
}
