//! Saved parameter state.
//!
//! [`ParameterState`] is what the host stores as the plugin's full state: every
//! parameter value keyed by its string identifier, serialized as JSON. Keying by
//! identifier instead of id keeps saved sessions loadable if the catalog order
//! ever changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};
use crate::tree::ParameterAutomationTree;
use crate::types::ParameterValue;

/// Current state format version.
pub const STATE_VERSION: u32 = 1;

/// Serializable snapshot of every parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterState {
    /// Format version the snapshot was written with.
    pub version: u32,
    /// Plain values keyed by parameter identifier.
    pub values: BTreeMap<String, ParameterValue>,
}

impl ParameterState {
    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> PluginResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from JSON bytes.
    ///
    /// Snapshots from a newer format version are rejected.
    pub fn from_bytes(data: &[u8]) -> PluginResult<Self> {
        let state: Self = serde_json::from_slice(data)?;
        if state.version > STATE_VERSION {
            return Err(PluginError::State(format!(
                "state version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }
        Ok(state)
    }
}

impl ParameterAutomationTree {
    /// Capture every current value.
    pub fn snapshot(&self) -> ParameterState {
        let values = self
            .catalog()
            .iter()
            .filter_map(|d| {
                self.get_value(d.id)
                    .ok()
                    .map(|v| (d.identifier.to_string(), v))
            })
            .collect();

        ParameterState {
            version: STATE_VERSION,
            values,
        }
    }

    /// Apply a snapshot through `set_value`, so values are clamped and the
    /// write-observer sees every change.
    ///
    /// Identifiers missing from the snapshot keep their current value. Unknown
    /// identifiers are skipped with a warning. Returns the number of values applied.
    pub fn restore(&self, state: &ParameterState) -> usize {
        let mut applied = 0;
        for (identifier, &value) in &state.values {
            let Some(descriptor) = self.catalog().find(identifier) else {
                log::warn!("Ignoring unknown parameter '{}' in saved state", identifier);
                continue;
            };
            if self.set_value(descriptor.id, value).is_ok() {
                applied += 1;
            }
        }
        log::debug!("Restored {} parameter value(s)", applied);
        applied
    }
}
