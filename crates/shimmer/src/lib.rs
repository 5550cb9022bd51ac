//! # Shimmer
//!
//! Stereo delay, reverb and pitch-shifted shimmer effect packaged for Audio Unit
//! hosts.
//!
//! ## Architecture
//!
//! ```text
//! AU host
//!    ↓ shimmer_au_* C-ABI
//! EffectInstance (shimmer-au)
//!    ↓
//! KernelHandle (shimmer-core)
//!    ↓
//! ShimmerCore (shimmer-dsp)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! // Once, when the binary loads:
//! shimmer::register();
//!
//! // Or drive an instance directly from Rust:
//! let mut effect = shimmer::create_effect()?;
//! effect.set_output_format(StreamFormat::new(48_000.0, 2))?;
//! effect.allocate_render_resources()?;
//! effect.tree().set_value(EffectParameter::DryWet.id(), 0.3)?;
//! ```

// Re-export sub-crates
pub use shimmer_au as au;
pub use shimmer_core as core;
pub use shimmer_dsp as dsp;

pub use shimmer_au::{EffectInstance, StreamFormat};
pub use shimmer_core::{
    Category, Config, ControlLayout, EffectParameter, ParameterAutomationTree, PluginError,
    PluginResult, Subcategory,
};
pub use shimmer_dsp::ShimmerCore;

/// Plugin identity reported to AU hosts.
pub static CONFIG: Config = Config::new("Shimmer", Category::Effect, "Edgl", "edgl")
    .with_vendor("Edgl")
    .with_version(env!("CARGO_PKG_VERSION"))
    .with_subcategories(&[
        Subcategory::Delay,
        Subcategory::Reverb,
        Subcategory::PitchShift,
        Subcategory::Stereo,
    ]);

/// Register the reference DSP core with the C-ABI factory.
///
/// Call once at load time, before the wrapper creates instances. Returns `false`
/// if a factory was already registered.
pub fn register() -> bool {
    shimmer_au::register_factory(ShimmerCore::boxed, &CONFIG)
}

/// Create an instance with the reference DSP core, without going through the
/// C-ABI factory.
pub fn create_effect() -> PluginResult<EffectInstance> {
    EffectInstance::new(&CONFIG, ShimmerCore::boxed)
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        create_effect, register, ControlLayout, EffectInstance, EffectParameter, PluginError,
        PluginResult, StreamFormat,
    };
    pub use shimmer_au::{AudioBufferList, AudioTimeStamp, BufferListStorage, RenderCall};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use super::*;

    #[test]
    fn test_config_identity() {
        assert_eq!(CONFIG.component_type_u32(), u32::from_be_bytes(*b"aufx"));
        assert_eq!(CONFIG.manufacturer_u32(), u32::from_be_bytes(*b"Edgl"));
        assert_eq!(CONFIG.subtype_u32(), u32::from_be_bytes(*b"edgl"));
        assert_eq!(CONFIG.au_tags(), "Delay,Reverb,Pitch,Stereo");
    }

    #[test]
    fn test_register_is_once_per_process() {
        register();
        assert!(shimmer_au::is_registered());
        assert!(!register());
        assert_eq!(shimmer_au::plugin_config().map(|c| c.name), Some("Shimmer"));
    }

    #[test]
    fn test_effect_end_to_end() {
        let mut effect = create_effect().unwrap();
        effect.set_output_format(StreamFormat::new(48_000.0, 2)).unwrap();
        effect.set_maximum_frames_to_render(128).unwrap();
        effect.allocate_render_resources().unwrap();

        let layout = ControlLayout::effect().unwrap();
        let control = layout.control_for(EffectParameter::DryWet);
        layout.apply(control, 0.0, effect.tree()).unwrap();

        let mut left = vec![0.0f32; 128];
        let mut right = vec![0.0f32; 128];
        let mut out = BufferListStorage::<2>::new();
        out.buffers_mut()[0].attach(&mut left, 1);
        out.buffers_mut()[1].attach(&mut right, 1);

        let mut ramp = |_: &mut u32,
                        _: &AudioTimeStamp,
                        frames: u32,
                        _: isize,
                        list: &mut AudioBufferList| {
            for i in 0..list.number_buffers {
                // SAFETY: the bridge's list holds number_buffers buffers.
                let buffer = unsafe { list.buffer_at_mut(i) };
                // SAFETY: the bridge attached `frames` samples per channel buffer.
                let samples = unsafe {
                    std::slice::from_raw_parts_mut(buffer.data as *mut f32, frames as usize)
                };
                for (n, s) in samples.iter_mut().enumerate() {
                    *s = n as f32 / 128.0;
                }
            }
            0
        };

        let call = RenderCall::new(128, out.as_mut_ptr());
        // SAFETY: `out` and its attached runs outlive the call.
        let status = unsafe { effect.render(&call, &mut ramp) };
        assert_eq!(status, shimmer_au::os_status::NO_ERR);
        assert_eq!(left[64], 0.5);
        assert_eq!(right[127], 127.0 / 128.0);

        effect.destroy().unwrap();
    }
}
