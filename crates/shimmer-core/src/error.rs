//! Error types for the Shimmer effect.

use std::fmt;

use crate::types::ParameterId;

/// Errors that can occur while driving the effect.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginError {
    /// The host's pull-input call returned a non-success status.
    HostPullFailure(i32),

    /// Parameter id outside the catalog.
    UnknownParameter(ParameterId),

    /// Operation called in a lifecycle state that does not allow it.
    ///
    /// This is a programmer error, never recovered from.
    LifecycleViolation {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state the handle or instance was in.
        state: &'static str,
    },

    /// Creating or initializing the DSP core failed.
    ResourceAllocationFailure(String),

    /// Stream format or buffer layout the effect cannot handle.
    UnsupportedFormat(String),

    /// State serialization/deserialization error.
    State(String),
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostPullFailure(status) => {
                write!(f, "Host pull-input failed with status {}", status)
            }
            Self::UnknownParameter(id) => write!(f, "Unknown parameter id {}", id),
            Self::LifecycleViolation { operation, state } => {
                write!(f, "Lifecycle violation: {} called while {}", operation, state)
            }
            Self::ResourceAllocationFailure(msg) => {
                write!(f, "Resource allocation failed: {}", msg)
            }
            Self::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            Self::State(msg) => write!(f, "State error: {}", msg),
        }
    }
}

impl std::error::Error for PluginError {}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> Self {
        Self::State(err.to_string())
    }
}

/// Result type for Shimmer operations.
pub type PluginResult<T> = Result<T, PluginError>;
