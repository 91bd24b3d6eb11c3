//! Runtime configuration.
//!
//! A [`RuntimeConfig`] is handed to [`Runtime::with_config`] once, when the
//! engine instance is created. Hosts usually keep it next to the rest of
//! their settings and load it with [`RuntimeConfig::from_json`]; every field
//! is optional and falls back to its default.
//!
//! [`Runtime::with_config`]: crate::Runtime::with_config

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of passes a single flush may take before it is aborted
    /// with [`ReactiveError::CascadeLimit`](crate::ReactiveError::CascadeLimit).
    ///
    /// Each pass runs the subscribers queued before it started; subscribers
    /// queued while a pass runs start the next one.
    pub max_flush_passes: usize,

    /// Log a warning when `resume` is called with no matching `pause`.
    pub warn_on_unbalanced_resume: bool,
}

impl RuntimeConfig {
    pub const DEFAULT_MAX_FLUSH_PASSES: usize = 100;

    /// Parse a configuration from JSON. Missing fields use their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_max_flush_passes(mut self, passes: usize) -> Self {
        self.max_flush_passes = passes;
        self
    }

    pub fn with_unbalanced_resume_warning(mut self, warn: bool) -> Self {
        self.warn_on_unbalanced_resume = warn;
        self
    }

    /// The effective pass limit. A limit of zero would reject every flush.
    pub(crate) fn flush_pass_limit(&self) -> usize {
        self.max_flush_passes.max(1)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_passes: Self::DEFAULT_MAX_FLUSH_PASSES,
            warn_on_unbalanced_resume: true,
        }
    }
}
