//! Data model: keys, values, plain data and the containers that observe it.

mod container;
mod data;
mod key;
mod update;
mod value;

pub use container::Container;
pub(crate) use data::DataInner;
pub use data::{Data, Shape};
pub use key::Key;
pub use update::Update;
pub use value::Value;
