//! # shimmer-au
//!
//! Audio Unit glue for the Shimmer effect.
//!
//! This crate sits between the Objective-C `AUAudioUnit` subclass and the DSP
//! core. It handles:
//!
//! - Factory registration (one effect per binary)
//! - Render resource lifecycle and format negotiation
//! - The render quantum: automation events, parameter sync, input pull,
//!   buffer layout resolution and processing
//! - Parameter metadata, values, observers and state over a C-ABI
//!
//! ```text
//! AU host (Logic Pro, GarageBand, etc.)
//!        ↓
//! AUAudioUnit subclass (Objective-C)
//!        ↓
//! C-ABI bridge (src/bridge.rs)
//!        ↓
//! EffectInstance → RenderBridge
//!        ↓
//! KernelHandle → Box<dyn DspCore>
//! ```
//!
//! ## Real-Time Safety
//!
//! - **Zero allocation**: every render buffer is sized at allocation time
//! - **try_lock()**: the render call never waits on setup calls
//! - **Lock-free parameters**: UI and automation write through atomics, and
//!   the kernel picks changes up at the next quantum boundary
//!
//! The crate holds no Apple framework bindings, so it builds and tests on any
//! platform.

pub mod bridge;
pub mod buffers;
pub mod error;
pub mod factory;
pub mod lifecycle;
mod objc_block;
pub mod render;

// Re-exports
pub use buffers::{AudioBuffer, AudioBufferList, BufferListStorage};
pub use error::{os_status, to_os_status};
pub use factory::{create_instance, is_registered, plugin_config, register_factory, CoreFactory};
pub use lifecycle::{EffectInstance, StreamFormat, MAX_FRAMES_PER_RENDER};
pub use render::{
    AURenderEvent, AudioTimeStamp, NoInput, PullInput, RenderBridge, RenderCall, RenderStage,
};
