//! Plain backing data.
//!
//! [`Data`] is a shared, untracked record or list. Reading or writing it
//! directly never notifies anybody; wrap it with [`Runtime::wrap`] to get a
//! [`Container`](super::Container) whose reads and writes are observed.
//!
//! The per-field dependency records and the computed fields of a container
//! live next to the data itself, so every wrapper of the same `Data` shares
//! them and they disappear together with the data.
//!
//! [`Runtime::wrap`]: crate::Runtime::wrap

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use smallvec::{smallvec, SmallVec};

use super::key::Key;
use super::value::Value;
use crate::error::{ReactiveError, Result};
use crate::reactive::dep::DepRecord;
use crate::reactive::memo::Memo;

/// Keys touched by a single mutation, in notification order.
pub(crate) type Changes = SmallVec<[Key; 4]>;

/// Layout of the backing data.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    /// Named fields in insertion order.
    Record(IndexMap<Rc<str>, Value>),
    /// Ordered, index-addressed items.
    List(Vec<Value>),
}

impl Shape {
    fn len(&self) -> usize {
        match self {
            Self::Record(fields) => fields.len(),
            Self::List(items) => items.len(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Record(_) => "record",
            Self::List(_) => "list",
        }
    }
}

/// Shared handle to a plain record or list.
///
/// Cloning is cheap and yields the same data; equality between values
/// holding `Data` is identity.
#[derive(Clone)]
pub struct Data(Rc<DataInner>);

pub(crate) struct DataInner {
    shape: RefCell<Shape>,
    /// Set once the data has been wrapped by any runtime.
    reactive: Cell<bool>,
    deps: RefCell<IndexMap<Key, Rc<DepRecord>>>,
    computed: RefCell<HashMap<Key, Rc<Memo>>>,
}

impl Data {
    fn from_shape(shape: Shape) -> Self {
        Self(Rc::new(DataInner {
            shape: RefCell::new(shape),
            reactive: Cell::new(false),
            deps: RefCell::new(IndexMap::new()),
            computed: RefCell::new(HashMap::new()),
        }))
    }

    /// An empty record.
    pub fn record() -> Self {
        Self::from_shape(Shape::Record(IndexMap::new()))
    }

    /// An empty list.
    pub fn list() -> Self {
        Self::from_shape(Shape::List(Vec::new()))
    }

    pub fn from_fields<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
    {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into().into_raw()))
            .collect();
        Self::from_shape(Shape::Record(fields))
    }

    pub fn from_values<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        let items = values.into_iter().map(|v| v.into().into_raw()).collect();
        Self::from_shape(Shape::List(items))
    }

    /// Build data from a JSON object or array. Scalars yield `None`.
    pub fn from_json(json: serde_json::Value) -> Option<Self> {
        match Value::from(json) {
            Value::Data(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn from_inner(inner: Rc<DataInner>) -> Self {
        Self(inner)
    }

    pub(crate) fn downgrade(&self) -> Weak<DataInner> {
        Rc::downgrade(&self.0)
    }

    /// Returns `true` if both handles refer to the same data.
    pub fn ptr_eq(&self, other: &Data) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_list(&self) -> bool {
        matches!(*self.0.shape.borrow(), Shape::List(_))
    }

    pub fn is_record(&self) -> bool {
        !self.is_list()
    }

    /// Number of fields or items.
    pub fn len(&self) -> usize {
        self.0.shape.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Field names or indices, in order.
    pub fn keys(&self) -> Vec<Key> {
        match &*self.0.shape.borrow() {
            Shape::Record(fields) => fields.keys().map(|k| Key::Field(k.clone())).collect(),
            Shape::List(items) => (0..items.len()).map(Key::Index).collect(),
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        match (&*self.0.shape.borrow(), key) {
            (Shape::Record(fields), Key::Field(name)) => fields.contains_key(name),
            (Shape::List(items), Key::Index(i)) => *i < items.len(),
            (_, Key::Shape) => true,
            _ => false,
        }
    }

    /// A shallow copy of the current contents.
    pub fn snapshot(&self) -> Shape {
        self.0.shape.borrow().clone()
    }

    /// Untracked read. Missing keys read as [`Value::Null`]; the structure
    /// key reads as the current length.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        self.read(&key.into())
    }

    /// Untracked write. Nobody is notified; follow up with
    /// [`Runtime::notify_data`](crate::Runtime::notify_data) if the data is
    /// observed.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        self.write(&key.into(), value.into()).map(drop)
    }

    /// Untracked append to a list.
    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        self.push_value(value.into()).map(drop)
    }

    pub(crate) fn read(&self, key: &Key) -> Value {
        let shape = self.0.shape.borrow();
        match (&*shape, key) {
            (_, Key::Shape) => Value::from(shape.len()),
            (Shape::Record(fields), Key::Field(name)) => {
                fields.get(name).cloned().unwrap_or_default()
            }
            (Shape::List(items), Key::Index(i)) => items.get(*i).cloned().unwrap_or_default(),
            _ => Value::Null,
        }
    }

    /// Store `value` under `key` and report what changed.
    ///
    /// Writing a value strictly equal to the current one changes nothing.
    /// A new record field or an append at `len` also changes the structure.
    pub(crate) fn write(&self, key: &Key, value: Value) -> Result<Changes> {
        let value = value.into_raw();
        self.ensure_acyclic(&value)?;
        let mut shape = self.0.shape.borrow_mut();
        let slot = match (&mut *shape, key) {
            (_, Key::Shape) => return Err(ReactiveError::ShapeKey),
            (Shape::Record(fields), Key::Field(name)) => {
                if !fields.contains_key(name) {
                    fields.insert(name.clone(), value);
                    return Ok(smallvec![key.clone(), Key::Shape]);
                }
                &mut fields[name]
            }
            (Shape::List(items), Key::Index(index)) => {
                let len = items.len();
                if *index == len {
                    items.push(value);
                    return Ok(smallvec![key.clone(), Key::Shape]);
                }
                if *index > len {
                    return Err(ReactiveError::IndexOutOfBounds { index: *index, len });
                }
                &mut items[*index]
            }
            (Shape::Record(_), _) => return Err(ReactiveError::ShapeMismatch { expected: "list" }),
            (Shape::List(_), _) => return Err(ReactiveError::ShapeMismatch { expected: "record" }),
        };
        if *slot == value {
            return Ok(Changes::new());
        }
        let old = std::mem::replace(slot, value);
        // Release the borrow before the old value is dropped.
        drop(shape);
        drop(old);
        Ok(smallvec![key.clone()])
    }

    pub(crate) fn remove_field(&self, key: &Key) -> Result<(Option<Value>, Changes)> {
        let Key::Field(name) = key else {
            return Err(ReactiveError::ShapeMismatch { expected: "record" });
        };
        let removed = match &mut *self.0.shape.borrow_mut() {
            Shape::Record(fields) => fields.shift_remove(name),
            Shape::List(_) => return Err(ReactiveError::ShapeMismatch { expected: "record" }),
        };
        let changes = match removed {
            Some(_) => smallvec![key.clone(), Key::Shape],
            None => Changes::new(),
        };
        Ok((removed, changes))
    }

    pub(crate) fn push_value(&self, value: Value) -> Result<Changes> {
        self.ensure_acyclic(&value)?;
        let mut shape = self.0.shape.borrow_mut();
        let items = list_mut(&mut shape)?;
        let index = items.len();
        items.push(value.into_raw());
        Ok(smallvec![Key::Index(index), Key::Shape])
    }

    pub(crate) fn pop_value(&self) -> Result<(Option<Value>, Changes)> {
        let mut shape = self.0.shape.borrow_mut();
        let items = list_mut(&mut shape)?;
        let popped = items.pop();
        let changes = match popped {
            Some(_) => smallvec![Key::Index(items.len()), Key::Shape],
            None => Changes::new(),
        };
        Ok((popped, changes))
    }

    pub(crate) fn insert_value(&self, index: usize, value: Value) -> Result<Changes> {
        self.ensure_acyclic(&value)?;
        let mut shape = self.0.shape.borrow_mut();
        let items = list_mut(&mut shape)?;
        let len = items.len();
        if index > len {
            return Err(ReactiveError::IndexOutOfBounds { index, len });
        }
        items.insert(index, value.into_raw());
        Ok(shifted(index, len + 1))
    }

    pub(crate) fn remove_value(&self, index: usize) -> Result<(Value, Changes)> {
        let mut shape = self.0.shape.borrow_mut();
        let items = list_mut(&mut shape)?;
        let len = items.len();
        if index >= len {
            return Err(ReactiveError::IndexOutOfBounds { index, len });
        }
        let removed = items.remove(index);
        Ok((removed, shifted(index, len)))
    }

    pub(crate) fn swap_values(&self, a: usize, b: usize) -> Result<Changes> {
        let mut shape = self.0.shape.borrow_mut();
        let items = list_mut(&mut shape)?;
        let len = items.len();
        if let Some(&index) = [a, b].iter().find(|&&i| i >= len) {
            return Err(ReactiveError::IndexOutOfBounds { index, len });
        }
        if items[a] == items[b] {
            return Ok(Changes::new());
        }
        items.swap(a, b);
        Ok(smallvec![Key::Index(a), Key::Index(b), Key::Shape])
    }

    pub(crate) fn truncate_values(&self, new_len: usize) -> Result<(Vec<Value>, Changes)> {
        let mut shape = self.0.shape.borrow_mut();
        let items = list_mut(&mut shape)?;
        let len = items.len();
        if new_len >= len {
            return Ok((Vec::new(), Changes::new()));
        }
        let removed = items.split_off(new_len);
        Ok((removed, shifted(new_len, len)))
    }

    /// Remove every field or item.
    pub(crate) fn clear_all(&self) -> (Shape, Changes) {
        let mut shape = self.0.shape.borrow_mut();
        let mut changes: Changes = match &*shape {
            Shape::Record(fields) => fields.keys().map(|k| Key::Field(k.clone())).collect(),
            Shape::List(items) => (0..items.len()).map(Key::Index).collect(),
        };
        if changes.is_empty() {
            return (Shape::List(Vec::new()), changes);
        }
        changes.push(Key::Shape);
        let empty = match &*shape {
            Shape::Record(_) => Shape::Record(IndexMap::new()),
            Shape::List(_) => Shape::List(Vec::new()),
        };
        (std::mem::replace(&mut *shape, empty), changes)
    }

    /// Replace the contents of a list, reporting every slot whose content
    /// changed.
    pub(crate) fn replace_values(&self, values: Vec<Value>) -> Result<(Vec<Value>, Changes)> {
        let values: Vec<Value> = values.into_iter().map(Value::into_raw).collect();
        for value in &values {
            self.ensure_acyclic(value)?;
        }
        let mut shape = self.0.shape.borrow_mut();
        let items = list_mut(&mut shape)?;
        let longest = items.len().max(values.len());
        let mut changes: Changes = (0..longest)
            .filter(|&i| items.get(i) != values.get(i))
            .map(Key::Index)
            .collect();
        if changes.is_empty() {
            return Ok((Vec::new(), changes));
        }
        changes.push(Key::Shape);
        Ok((std::mem::replace(items, values), changes))
    }

    /// Refuse to store `value` if this data is reachable from it.
    fn ensure_acyclic(&self, value: &Value) -> Result<()> {
        match value.as_data() {
            Some(nested) if nested.reaches(self) => Err(ReactiveError::CyclicData),
            _ => Ok(()),
        }
    }

    /// Returns `true` if `target` is this data or nested anywhere inside it.
    fn reaches(&self, target: &Data) -> bool {
        if self.ptr_eq(target) {
            return true;
        }
        let nested_reaches = |value: &Value| value.as_data().is_some_and(|n| n.reaches(target));
        let shape = self.0.shape.borrow();
        match &*shape {
            Shape::Record(fields) => fields.values().any(nested_reaches),
            Shape::List(items) => items.iter().any(nested_reaches),
        }
    }

    pub(crate) fn mark_reactive(&self) {
        self.0.reactive.set(true);
    }

    pub(crate) fn is_reactive(&self) -> bool {
        self.0.reactive.get()
    }

    /// The dependency record for `key`, created on first use.
    pub(crate) fn record_for(&self, key: &Key) -> Rc<DepRecord> {
        self.0
            .deps
            .borrow_mut()
            .entry(key.clone())
            .or_insert_with(|| DepRecord::new(key.clone()))
            .clone()
    }

    pub(crate) fn existing_record(&self, key: &Key) -> Option<Rc<DepRecord>> {
        self.0.deps.borrow().get(key).cloned()
    }

    /// The record for `key`, or every record if `key` is `None`.
    pub(crate) fn records(&self, key: Option<&Key>) -> Vec<Rc<DepRecord>> {
        match key {
            Some(key) => self.existing_record(key).into_iter().collect(),
            None => self.0.deps.borrow().values().cloned().collect(),
        }
    }

    pub(crate) fn memo(&self, key: &Key) -> Option<Rc<Memo>> {
        self.0.computed.borrow().get(key).cloned()
    }

    pub(crate) fn insert_memo(&self, key: Key, memo: Rc<Memo>) -> Option<Rc<Memo>> {
        self.0.computed.borrow_mut().insert(key, memo)
    }

    pub(crate) fn remove_memo(&self, key: &Key) -> Option<Rc<Memo>> {
        self.0.computed.borrow_mut().remove(key)
    }
}

fn list_mut(shape: &mut Shape) -> Result<&mut Vec<Value>> {
    match shape {
        Shape::List(items) => Ok(items),
        Shape::Record(_) => Err(ReactiveError::ShapeMismatch { expected: "list" }),
    }
}

/// Indices `from..to` plus the structure key.
fn shifted(from: usize, to: usize) -> Changes {
    let mut changes: Changes = (from..to).map(Key::Index).collect();
    changes.push(Key::Shape);
    changes
}

impl Serialize for Data {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &*self.0.shape.borrow() {
            Shape::Record(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(&**name, value)?;
                }
                map.end()
            }
            Shape::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = self.0.shape.borrow();
        f.debug_struct("Data")
            .field("kind", &shape.kind())
            .field("len", &shape.len())
            .finish()
    }
}
