//! Multi-field updates.

use std::fmt;

use super::container::Container;
use super::key::Key;
use super::value::Value;
use crate::error::Result;

/// A single entry of [`Container::update`].
pub enum Update {
    /// Write this value.
    Value(Value),
    /// Compute the value to write from the current one.
    With(Box<dyn FnOnce(Value) -> Value>),
}

impl Update {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    pub fn with(f: impl FnOnce(Value) -> Value + 'static) -> Self {
        Self::With(Box::new(f))
    }
}

impl From<Value> for Update {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::With(_) => f.write_str("With(..)"),
        }
    }
}

impl Container {
    /// Apply several writes inside one batch.
    ///
    /// Entries are applied in order; an [`Update::With`] sees the value left
    /// by earlier entries. Subscribers run once, after the last entry. If an
    /// entry fails, the entries before it stay applied and are flushed.
    pub fn update<K, I>(&self, updates: I) -> Result<()>
    where
        K: Into<Key>,
        I: IntoIterator<Item = (K, Update)>,
    {
        self.runtime().batch(|| -> Result<()> {
            for (key, update) in updates {
                let key = key.into();
                let value = match update {
                    Update::Value(value) => value,
                    Update::With(f) => f(self.peek(key.clone())?),
                };
                self.set(key, value)?;
            }
            Ok(())
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Runtime;
    use crate::store::Data;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn applies_values_and_functions_in_one_run() {
        let runtime = Runtime::new();
        let state = runtime.wrap(&Data::from_fields([("a", 1), ("b", 10)]));
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _reaction = runtime
            .reaction({
                let state = state.clone();
                let seen = seen.clone();
                move || {
                    let a = state.get("a")?.as_f64().unwrap_or_default();
                    let b = state.get("b")?.as_f64().unwrap_or_default();
                    seen.borrow_mut().push((a, b));
                    Ok(())
                }
            })
            .unwrap();

        state
            .update([
                ("a", Update::value(2)),
                (
                    "b",
                    Update::with(|prev| Value::from(prev.as_f64().unwrap_or_default() + 1.0)),
                ),
            ])
            .unwrap();

        assert_eq!(*seen.borrow(), vec![(1.0, 10.0), (2.0, 11.0)]);
        assert!(!runtime.is_batching());
    }

    #[test]
    fn function_sees_earlier_entries() {
        let runtime = Runtime::new();
        let state = runtime.wrap(&Data::from_fields([("n", 1)]));

        let double = || Update::with(|prev| Value::from(prev.as_f64().unwrap_or_default() * 2.0));
        state.update([("n", double()), ("n", double())]).unwrap();

        assert_eq!(state.peek("n").unwrap(), Value::from(4));
    }

    #[test]
    fn failing_entry_keeps_earlier_writes() {
        let runtime = Runtime::new();
        let state = runtime.wrap(&Data::from_fields([("a", 1)]));

        let result = state.update([
            (Key::from("a"), Update::value(2)),
            (Key::Shape, Update::value(0)),
        ]);

        assert!(result.is_err());
        assert_eq!(state.peek("a").unwrap(), Value::from(2));
        assert_eq!(runtime.depth(), 0);
    }
}
