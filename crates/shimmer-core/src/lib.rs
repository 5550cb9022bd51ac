//! # shimmer-core
//!
//! Host-agnostic building blocks of the Shimmer delay/reverb effect.
//!
//! ## Parameters
//!
//! - [`ParameterCatalog`] - Static table of parameter descriptors
//! - [`ParameterAutomationTree`] - Lock-free runtime values with observer hooks
//! - [`NotificationPump`] - Delivers changes to observers off the render thread
//! - [`ParameterState`] - Serializable snapshot for host state save/restore
//! - [`ControlLayout`] - Typed control-to-parameter bindings for editors
//!
//! ## DSP
//!
//! - [`DspCore`] - Contract for the signal-processing core
//! - [`KernelHandle`] - Owns one core and enforces its lifecycle
//!
//! ## Types
//!
//! - [`Config`] - Plugin metadata and AU identity
//! - [`PluginError`] - Error types

pub mod catalog;
pub mod config;
pub mod controls;
pub mod error;
pub mod kernel;
pub mod notification;
pub mod parameter_format;
pub mod state;
pub mod tree;
pub mod types;

// Re-exports for convenience
pub use catalog::{EffectParameter, ParameterCatalog, ParameterDescriptor, ParameterUnit};
pub use config::{Category, Config, FourCharCode, Subcategory};
pub use controls::{ControlId, ControlLayout, ControlSection};
pub use error::{PluginError, PluginResult};
pub use kernel::{DspCore, KernelHandle, KernelState};
pub use notification::{NotificationPump, DEFAULT_PUMP_INTERVAL};
pub use parameter_format::Formatter;
pub use state::{ParameterState, STATE_VERSION};
pub use tree::{ObserverToken, ParameterAutomationTree, PendingChanges};
pub use types::{ParameterId, ParameterValue, MAX_PARAMETERS, STEREO};
