//! Error types for the reactive engine.
//!
//! Every failure in this crate is a programming error surfaced synchronously
//! to the caller that triggered it: the write, notify, flush or read that
//! caused a subscriber to run. There is no retry policy at this layer.

use thiserror::Error;

use crate::reactive::SubscriberId;
use crate::store::Key;

/// Error type returned by user callbacks (reactions, watchers, derivations).
///
/// The engine is single-threaded, so callback errors are not required to be
/// `Send` or `Sync`.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Errors produced by the reactive engine.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A reaction or watcher callback returned an error.
    #[error("subscriber {subscriber} failed: {source}")]
    Subscriber {
        subscriber: SubscriberId,
        name: Option<String>,
        source: BoxError,
    },

    /// A computed field read itself, directly or transitively, while it was
    /// being recomputed.
    #[error("cycle detected while computing `{key}`")]
    CycleDetected { key: Key },

    /// A computed field's derivation returned an error.
    #[error("failed to derive `{key}`: {source}")]
    Derive { key: Key, source: BoxError },

    /// A flush kept producing new work past the configured pass limit.
    #[error("flush did not settle after {passes} passes")]
    CascadeLimit { passes: usize },

    /// Computed fields are read-only.
    #[error("`{key}` is a computed field and cannot be written")]
    ComputedWrite { key: Key },

    /// The structure key is maintained by the engine and cannot be written.
    #[error("the structure key cannot be written directly")]
    ShapeKey,

    /// The operation requires a container of a different shape.
    #[error("operation requires a {expected} container")]
    ShapeMismatch { expected: &'static str },

    /// The write would make the data contain itself.
    #[error("data cannot contain itself")]
    CyclicData,

    /// A list index was outside the current bounds.
    #[error("index {index} is out of bounds for a list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// JSON conversion failed (configuration or snapshot).
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ReactiveError {
    /// Convert a callback error into a `ReactiveError`.
    ///
    /// Engine errors that travelled through a callback (for instance a cycle
    /// detected inside a nested computed read) come back out unchanged; any
    /// other error is wrapped with `wrap`.
    pub(crate) fn from_callback(err: BoxError, wrap: impl FnOnce(BoxError) -> Self) -> Self {
        match err.downcast::<ReactiveError>() {
            Ok(inner) => *inner,
            Err(other) => wrap(other),
        }
    }

    /// Returns `true` for [`ReactiveError::CycleDetected`].
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::CycleDetected { .. })
    }
}
