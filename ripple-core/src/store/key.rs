//! Field keys.

use std::fmt;
use std::rc::Rc;

/// Identifies one tracked slot of a container.
///
/// Records are addressed by [`Key::Field`], lists by [`Key::Index`].
/// [`Key::Shape`] is the synthetic structure key: it is notified whenever a
/// container gains or loses slots (or a list is reordered), and read by
/// anything that depends on the set of slots rather than on one of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Field(Rc<str>),
    Index(usize),
    Shape,
}

impl Key {
    pub fn field(name: impl Into<Rc<str>>) -> Self {
        Self::Field(name.into())
    }

    pub fn as_field(&self) -> Option<&str> {
        match self {
            Self::Field(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.write_str(name),
            Self::Index(index) => write!(f, "[{index}]"),
            Self::Shape => f.write_str("<shape>"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Field(name.into())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Field(name.into())
    }
}

impl From<Rc<str>> for Key {
    fn from(name: Rc<str>) -> Self {
        Self::Field(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(Key::from("name"), Key::field("name"));
        assert_eq!(Key::from(String::from("name")).as_field(), Some("name"));
        assert_eq!(Key::from(3usize).as_index(), Some(3));
        assert_eq!(Key::Shape.as_field(), None);
    }

    #[test]
    fn display() {
        assert_eq!(Key::from("total").to_string(), "total");
        assert_eq!(Key::Index(2).to_string(), "[2]");
        assert_eq!(Key::Shape.to_string(), "<shape>");
    }
}
