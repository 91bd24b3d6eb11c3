//! Reactive containers.
//!
//! A [`Container`] pairs plain [`Data`] with the [`Runtime`] that observes
//! it. Every read goes through [`Container::get`] (or one of the structural
//! readers) and registers the running subscriber; every write goes through
//! [`Container::set`] (or one of the structural writers) and notifies the
//! subscribers of the keys whose value actually changed.
//!
//! Nested data read out of a container comes back wrapped in a container of
//! the same runtime. Containers compare by identity, so reading the same
//! nested field twice yields equal values.

use std::fmt;
use std::rc::Rc;

use smallvec::{smallvec, SmallVec};
use tracing::debug;

use super::data::{Changes, Data};
use super::key::Key;
use super::value::Value;
use crate::error::{BoxError, ReactiveError, Result};
use crate::reactive::dep::DepRecord;
use crate::reactive::memo::Memo;
use crate::reactive::runtime::notify_records;
use crate::reactive::subscriber::{Body, Subscriber, SubscriberKind};
use crate::reactive::{MemoState, Runtime, WatchOptions, Watcher};

/// Observed view of a record or list.
#[derive(Clone)]
pub struct Container {
    data: Data,
    runtime: Runtime,
}

impl Container {
    pub(crate) fn new(runtime: Runtime, data: Data) -> Self {
        data.mark_reactive();
        Self { data, runtime }
    }

    /// The backing data.
    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Returns `true` if both containers wrap the same data in the same
    /// runtime.
    pub fn ptr_eq(&self, other: &Container) -> bool {
        self.data.ptr_eq(&other.data) && self.runtime.ptr_eq(&other.runtime)
    }

    pub fn is_list(&self) -> bool {
        self.data.is_list()
    }

    pub fn is_record(&self) -> bool {
        self.data.is_record()
    }

    // ---- Reads ----

    /// Tracked read of `key`.
    ///
    /// Missing keys read as [`Value::Null`]. Computed fields return their
    /// cached value, recomputing it first if it is dirty.
    pub fn get(&self, key: impl Into<Key>) -> Result<Value> {
        let key = key.into();
        if let Some(memo) = self.data.memo(&key) {
            return memo.get(self);
        }
        self.track(&key);
        Ok(self.lift(self.data.read(&key)))
    }

    /// Read `key` without registering a dependency.
    pub fn peek(&self, key: impl Into<Key>) -> Result<Value> {
        let key = key.into();
        self.runtime.untrack(|| self.get(key))
    }

    /// Number of fields or items. Tracks the structure.
    pub fn len(&self) -> usize {
        self.track(&Key::Shape);
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Field names or indices. Tracks the structure.
    pub fn keys(&self) -> Vec<Key> {
        self.track(&Key::Shape);
        self.data.keys()
    }

    /// Tracks both `key` and the structure.
    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        self.track(&key);
        self.track(&Key::Shape);
        self.data.contains(&key)
    }

    /// Every stored value in order. Tracks the structure and each key.
    pub fn values(&self) -> Vec<Value> {
        self.track(&Key::Shape);
        self.data
            .keys()
            .into_iter()
            .map(|key| {
                self.track(&key);
                self.lift(self.data.read(&key))
            })
            .collect()
    }

    /// Untracked JSON snapshot of the backing data.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(&self.data)?)
    }

    pub(crate) fn track(&self, key: &Key) {
        if self.runtime.is_tracking() {
            self.runtime.track(&self.data.record_for(key));
        }
    }

    /// Hand nested data out as a container of the same runtime.
    pub(crate) fn lift(&self, value: Value) -> Value {
        match value {
            Value::Data(data) => Value::Container(self.runtime.wrap(&data)),
            other => other,
        }
    }

    // ---- Writes ----

    /// Write `value` under `key`.
    ///
    /// Subscribers of `key` are notified only if the stored value changes
    /// under strict equality. Adding a record field or appending at the end
    /// of a list also notifies the structure. Storing data that already
    /// contains this container's data fails with
    /// [`ReactiveError::CyclicData`].
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        self.ensure_writable(&key)?;
        let changes = self.data.write(&key, value.into())?;
        self.notify_changes(&changes)
    }

    /// Remove a record field, returning its previous value.
    pub fn remove(&self, key: impl Into<Key>) -> Result<Value> {
        let key = key.into();
        self.ensure_writable(&key)?;
        let (removed, changes) = self.data.remove_field(&key)?;
        self.notify_changes(&changes)?;
        Ok(removed.map(|v| self.lift(v)).unwrap_or_default())
    }

    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        let changes = self.data.push_value(value.into())?;
        self.notify_changes(&changes)
    }

    /// Remove the last item. Returns [`Value::Null`] on an empty list.
    pub fn pop(&self) -> Result<Value> {
        let (popped, changes) = self.data.pop_value()?;
        self.notify_changes(&changes)?;
        Ok(popped.map(|v| self.lift(v)).unwrap_or_default())
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        let changes = self.data.insert_value(index, value.into())?;
        self.notify_changes(&changes)
    }

    pub fn remove_at(&self, index: usize) -> Result<Value> {
        let (removed, changes) = self.data.remove_value(index)?;
        self.notify_changes(&changes)?;
        Ok(self.lift(removed))
    }

    pub fn swap(&self, a: usize, b: usize) -> Result<()> {
        let changes = self.data.swap_values(a, b)?;
        self.notify_changes(&changes)
    }

    pub fn truncate(&self, len: usize) -> Result<()> {
        let (_removed, changes) = self.data.truncate_values(len)?;
        self.notify_changes(&changes)
    }

    /// Remove every field or item.
    pub fn clear(&self) -> Result<()> {
        let (_old, changes) = self.data.clear_all();
        self.notify_changes(&changes)
    }

    /// Replace the items of a list. Only slots whose content changed are
    /// notified.
    pub fn replace_all<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Result<()> {
        let values = values.into_iter().map(Into::into).collect();
        let (_old, changes) = self.data.replace_values(values)?;
        self.notify_changes(&changes)
    }

    /// Notify the subscribers of `key`, or of every key if `None`, whether
    /// or not anything changed.
    pub fn notify(&self, key: Option<Key>) -> Result<()> {
        notify_records(&self.data.records(key.as_ref()))
    }

    fn ensure_writable(&self, key: &Key) -> Result<()> {
        if self.data.memo(key).is_some() {
            return Err(ReactiveError::ComputedWrite { key: key.clone() });
        }
        Ok(())
    }

    fn notify_changes(&self, changes: &Changes) -> Result<()> {
        let records: SmallVec<[Rc<DepRecord>; 4]> = changes
            .iter()
            .filter_map(|key| self.data.existing_record(key))
            .collect();
        if records.is_empty() {
            return Ok(());
        }
        notify_records(&records)
    }

    // ---- Computed fields ----

    /// Attach a computed field under `key`.
    ///
    /// `derive` receives this container and runs lazily, on the first read
    /// after creation or after one of the fields it read changed. Defining
    /// a field again replaces the previous derivation.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ripple_core::{Data, Runtime, Value};
    ///
    /// let runtime = Runtime::new();
    /// let cart = runtime.wrap(&Data::from_fields([("price", 4), ("qty", 3)]));
    /// cart.define_computed("total", |c| {
    ///     let price = c.get("price")?.as_f64().unwrap_or_default();
    ///     let qty = c.get("qty")?.as_f64().unwrap_or_default();
    ///     Ok(Value::from(price * qty))
    /// })?;
    ///
    /// assert_eq!(cart.get("total")?, Value::from(12));
    /// cart.set("qty", 5)?;
    /// assert_eq!(cart.get("total")?, Value::from(20));
    /// # Ok::<(), ripple_core::ReactiveError>(())
    /// ```
    pub fn define_computed<F>(&self, key: impl Into<Key>, derive: F) -> Result<()>
    where
        F: Fn(&Container) -> Result<Value, BoxError> + 'static,
    {
        let key = key.into();
        if key == Key::Shape {
            return Err(ReactiveError::ShapeKey);
        }
        let body = Body::Computed {
            source: self.data.downgrade(),
            key: key.clone(),
        };
        let subscriber = Rc::new(Subscriber::new(SubscriberKind::Computed, &self.runtime, body));
        debug!(subscriber = %subscriber.id(), %key, "computed defined");

        let memo = Rc::new(Memo::new(key.clone(), Box::new(derive), subscriber));
        if let Some(previous) = self.data.insert_memo(key.clone(), memo) {
            previous.dispose();
        }
        self.notify_changes(&smallvec![key])
    }

    /// Detach the computed field under `key`. Returns `false` if there was
    /// none.
    pub fn remove_computed(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        let Some(memo) = self.data.remove_memo(&key) else {
            return Ok(false);
        };
        memo.dispose();
        self.notify_changes(&smallvec![key])?;
        Ok(true)
    }

    /// Dirty state of the computed field under `key`, if there is one.
    pub fn computed_state(&self, key: impl Into<Key>) -> Option<MemoState> {
        self.data.memo(&key.into()).map(|memo| memo.state())
    }

    /// Mark a computed field stale and notify its readers.
    pub fn invalidate(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        let Some(memo) = self.data.memo(&key) else {
            return Ok(());
        };
        if memo.mark_dirty() {
            self.notify_changes(&smallvec![key])?;
        }
        Ok(())
    }

    // ---- Subscribers ----

    /// Watch a single key. The callback receives `(new, old)`.
    pub fn watch<C>(&self, key: impl Into<Key>, callback: C) -> Result<Watcher>
    where
        C: Fn(&Value, &Value) -> Result<(), BoxError> + 'static,
    {
        let key = key.into();
        let container = self.clone();
        self.runtime.watch(
            move || Ok(container.get(key.clone())?),
            callback,
            WatchOptions::default(),
        )
    }

    /// Number of subscribers registered against `key`.
    pub fn subscriber_count(&self, key: impl Into<Key>) -> usize {
        self.data
            .existing_record(&key.into())
            .map_or(0, |record| record.len())
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container").field("data", &self.data).finish()
    }
}
