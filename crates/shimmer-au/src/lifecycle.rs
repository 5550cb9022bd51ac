//! Effect instance lifecycle.
//!
//! [`EffectInstance`] binds the host's setup calls to the kernel:
//!
//! ```text
//! Unallocated --[allocate_render_resources]--> Allocated
//!      ^                                           |
//!      +------[deallocate_render_resources]--------+
//! ```
//!
//! Format and maximum frame count are negotiated while unallocated. Allocation
//! initializes the kernel with the negotiated format, pushes every tree value into
//! it and builds a [`RenderBridge`]. Deallocation drops the bridge and resets the
//! kernel. `destroy` releases the kernel exactly once.

use std::sync::Arc;

use shimmer_core::{
    Config, DspCore, KernelHandle, KernelState, ParameterAutomationTree, ParameterCatalog,
    ParameterState, PendingChanges, PluginError, PluginResult,
};

use crate::error::os_status;
use crate::render::{PullInput, RenderBridge, RenderCall, RenderStage};

/// Largest quantum a host may negotiate.
pub const MAX_FRAMES_PER_RENDER: u32 = 8192;

/// Negotiated output bus format. Input matches output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamFormat {
    pub sample_rate: f64,
    /// 1 (mono) or 2 (stereo).
    pub channel_count: u32,
    /// Stereo carried in one two-channel buffer instead of one buffer per channel.
    pub interleaved: bool,
}

impl StreamFormat {
    /// De-interleaved format.
    pub const fn new(sample_rate: f64, channel_count: u32) -> Self {
        Self {
            sample_rate,
            channel_count,
            interleaved: false,
        }
    }

    /// Same format, interleaved.
    pub const fn interleaved(mut self) -> Self {
        self.interleaved = true;
        self
    }

    /// Default format from a plugin config.
    pub const fn from_config(config: &Config) -> Self {
        Self::new(config.sample_rate, config.channel_count)
    }

    fn validate(&self) -> PluginResult<()> {
        if !(1..=2).contains(&self.channel_count) {
            return Err(PluginError::UnsupportedFormat(format!(
                "{} channels (expected 1 or 2)",
                self.channel_count
            )));
        }
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(PluginError::UnsupportedFormat(format!(
                "sample rate {}",
                self.sample_rate
            )));
        }
        Ok(())
    }
}

/// Render resource state.
enum RenderResources {
    /// Format negotiable, no render possible.
    Unallocated,
    /// Bridge built, ready to render.
    Allocated(Box<RenderBridge>),
}

impl RenderResources {
    fn name(&self) -> &'static str {
        match self {
            Self::Unallocated => "unallocated",
            Self::Allocated(_) => "allocated",
        }
    }
}

/// One effect instance as the host sees it.
pub struct EffectInstance {
    config: &'static Config,
    kernel: KernelHandle,
    tree: Arc<ParameterAutomationTree>,
    /// Ids written since the kernel last saw them.
    pending: Arc<PendingChanges>,
    format: StreamFormat,
    max_frames: u32,
    resources: RenderResources,
}

impl EffectInstance {
    /// Build an instance around the core `factory` makes.
    ///
    /// The tree starts at catalog defaults and every default is pushed into the
    /// kernel before this returns.
    pub fn new<F>(config: &'static Config, factory: F) -> PluginResult<Self>
    where
        F: FnOnce() -> PluginResult<Box<dyn DspCore>>,
    {
        Self::with_catalog(config, ParameterCatalog::effect(), factory)
    }

    /// Build an instance with a custom catalog.
    pub fn with_catalog<F>(
        config: &'static Config,
        catalog: ParameterCatalog,
        factory: F,
    ) -> PluginResult<Self>
    where
        F: FnOnce() -> PluginResult<Box<dyn DspCore>>,
    {
        let kernel = KernelHandle::create(factory)?;

        let pending = Arc::new(PendingChanges::new());
        let sink = Arc::clone(&pending);
        let tree = Arc::new(
            ParameterAutomationTree::new(catalog)?.with_value_observer(move |id, _| sink.mark(id)),
        );

        let mut instance = Self {
            config,
            kernel,
            tree,
            pending,
            format: StreamFormat::from_config(config),
            max_frames: config.max_frames,
            resources: RenderResources::Unallocated,
        };
        instance.push_all_parameters()?;

        log::debug!(
            "Created {} instance ({} parameters)",
            config.name,
            instance.tree.len()
        );
        Ok(instance)
    }

    pub fn config(&self) -> &'static Config {
        self.config
    }

    /// The shared parameter tree.
    pub fn tree(&self) -> &Arc<ParameterAutomationTree> {
        &self.tree
    }

    pub fn kernel(&self) -> &KernelHandle {
        &self.kernel
    }

    pub fn output_format(&self) -> StreamFormat {
        self.format
    }

    pub fn maximum_frames_to_render(&self) -> u32 {
        self.max_frames
    }

    pub fn is_allocated(&self) -> bool {
        matches!(self.resources, RenderResources::Allocated(_))
    }

    pub fn is_destroyed(&self) -> bool {
        self.kernel.state() == KernelState::Destroyed
    }

    /// Last stage reached by the most recent quantum, if allocated.
    pub fn last_render_stage(&self) -> Option<RenderStage> {
        match &self.resources {
            RenderResources::Allocated(bridge) => bridge.last_stage(),
            RenderResources::Unallocated => None,
        }
    }

    /// Set the output bus format. Only while unallocated.
    pub fn set_output_format(&mut self, format: StreamFormat) -> PluginResult<()> {
        self.require_unallocated("set_output_format")?;
        format.validate()?;
        self.format = format;
        log::debug!(
            "Output format: {} channel(s) at {} Hz{}",
            format.channel_count,
            format.sample_rate,
            if format.interleaved { ", interleaved" } else { "" }
        );
        Ok(())
    }

    /// Set the largest quantum the host will render. Only while unallocated.
    pub fn set_maximum_frames_to_render(&mut self, max_frames: u32) -> PluginResult<()> {
        self.require_unallocated("set_maximum_frames_to_render")?;
        if !(1..=MAX_FRAMES_PER_RENDER).contains(&max_frames) {
            return Err(PluginError::UnsupportedFormat(format!(
                "maximum frames {} (expected 1..={})",
                max_frames, MAX_FRAMES_PER_RENDER
            )));
        }
        self.max_frames = max_frames;
        Ok(())
    }

    /// Prepare the kernel and build render storage.
    ///
    /// Calling this while allocated re-prepares with the current format.
    pub fn allocate_render_resources(&mut self) -> PluginResult<()> {
        self.require_alive("allocate_render_resources")?;

        if self.is_allocated() {
            log::debug!("Re-allocating render resources");
            self.resources = RenderResources::Unallocated;
        }

        self.kernel
            .initialize(self.format.channel_count, self.format.sample_rate)?;
        self.push_all_parameters()?;
        self.resources =
            RenderResources::Allocated(Box::new(RenderBridge::new(self.format, self.max_frames)));

        log::info!(
            "Render resources allocated: {} Hz, {} channel(s), {} max frames",
            self.format.sample_rate,
            self.format.channel_count,
            self.max_frames
        );
        Ok(())
    }

    /// Drop render storage and reset the kernel. A no-op while unallocated.
    pub fn deallocate_render_resources(&mut self) -> PluginResult<()> {
        if !self.is_allocated() {
            return Ok(());
        }
        self.resources = RenderResources::Unallocated;
        self.kernel.reset()?;
        log::info!("Render resources deallocated");
        Ok(())
    }

    /// Clear DSP state (delay tails, reverb) without touching resources.
    pub fn reset(&mut self) -> PluginResult<()> {
        self.require_alive("reset")?;
        self.kernel.reset()
    }

    /// Release the kernel. Deallocates first if needed.
    pub fn destroy(&mut self) -> PluginResult<()> {
        self.require_alive("destroy")?;
        self.deallocate_render_resources()?;
        self.kernel.destroy()?;
        log::debug!("{} instance destroyed", self.config.name);
        Ok(())
    }

    /// Render one quantum. Returns an OSStatus.
    ///
    /// # Safety
    /// Same contract as [`RenderBridge::render`].
    pub unsafe fn render<P: PullInput + ?Sized>(&mut self, call: &RenderCall, pull: &mut P) -> i32 {
        let RenderResources::Allocated(bridge) = &mut self.resources else {
            return os_status::K_AUDIO_UNIT_ERR_UNINITIALIZED;
        };
        // SAFETY: forwarded caller contract.
        unsafe { bridge.render(&mut self.kernel, &self.tree, &self.pending, call, pull) }
    }

    /// Serialize every parameter value.
    pub fn full_state(&self) -> PluginResult<Vec<u8>> {
        self.tree.snapshot().to_bytes()
    }

    /// Restore parameter values from [`EffectInstance::full_state`] bytes.
    ///
    /// Returns the number of values applied. The kernel picks them up on the next
    /// quantum, or immediately when unallocated.
    pub fn set_full_state(&mut self, data: &[u8]) -> PluginResult<usize> {
        let state = ParameterState::from_bytes(data)?;
        let applied = self.tree.restore(&state);
        if !self.is_allocated() && !self.is_destroyed() {
            self.drain_pending()?;
        }
        Ok(applied)
    }

    /// Write every tree value into the kernel.
    fn push_all_parameters(&mut self) -> PluginResult<()> {
        self.pending.mark_all(self.tree.len());
        self.drain_pending()
    }

    fn drain_pending(&mut self) -> PluginResult<()> {
        let mut result = Ok(());
        let (tree, kernel) = (&self.tree, &mut self.kernel);
        self.pending.drain(|id| {
            if let Ok(value) = tree.get_value(id) {
                if let Err(e) = kernel.set_parameter(id, value) {
                    result = Err(e);
                }
            }
        });
        result
    }

    fn require_unallocated(&self, operation: &'static str) -> PluginResult<()> {
        self.require_alive(operation)?;
        if self.is_allocated() {
            log::warn!("{} rejected while render resources are allocated", operation);
            return Err(PluginError::LifecycleViolation {
                operation,
                state: self.resources.name(),
            });
        }
        Ok(())
    }

    fn require_alive(&self, operation: &'static str) -> PluginResult<()> {
        if self.is_destroyed() {
            log::error!("{} called on a destroyed instance", operation);
            return Err(PluginError::LifecycleViolation {
                operation,
                state: KernelState::Destroyed.as_str(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for EffectInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectInstance")
            .field("name", &self.config.name)
            .field("kernel", &self.kernel.state())
            .field("format", &self.format)
            .field("max_frames", &self.max_frames)
            .field("resources", &self.resources.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::{AudioBufferList, BufferListStorage};
    use crate::render::AudioTimeStamp;
    use shimmer_core::{Category, EffectParameter};
    use shimmer_dsp::ShimmerCore;

    static CONFIG: Config = Config::new("Test Shimmer", Category::Effect, "Test", "tsh1");

    fn instance() -> EffectInstance {
        EffectInstance::new(&CONFIG, ShimmerCore::boxed).unwrap()
    }

    fn silence(_: &mut u32, _: &AudioTimeStamp, _: u32, _: isize, _: &mut AudioBufferList) -> i32 {
        os_status::NO_ERR
    }

    #[test]
    fn test_construction_defaults() {
        let fx = instance();
        assert_eq!(fx.output_format(), StreamFormat::new(44_100.0, 2));
        assert_eq!(fx.maximum_frames_to_render(), 512);
        assert!(!fx.is_allocated());
        assert_eq!(fx.kernel().get_parameter(0).unwrap(), 375.0);
    }

    #[test]
    fn test_format_only_while_unallocated() {
        let mut fx = instance();
        fx.set_output_format(StreamFormat::new(48_000.0, 1)).unwrap();
        fx.set_maximum_frames_to_render(1024).unwrap();
        assert!(matches!(
            fx.set_output_format(StreamFormat::new(48_000.0, 6)),
            Err(PluginError::UnsupportedFormat(_))
        ));
        assert!(fx.set_maximum_frames_to_render(0).is_err());

        fx.allocate_render_resources().unwrap();
        assert_eq!(fx.kernel().sample_rate(), 48_000.0);
        assert_eq!(fx.kernel().channel_count(), 1);
        assert_eq!(
            fx.set_output_format(StreamFormat::new(44_100.0, 2)),
            Err(PluginError::LifecycleViolation {
                operation: "set_output_format",
                state: "allocated",
            })
        );
        assert!(fx.set_maximum_frames_to_render(256).is_err());
    }

    #[test]
    fn test_allocate_twice_reprepares() {
        let mut fx = instance();
        fx.allocate_render_resources().unwrap();
        fx.tree().set_value(EffectParameter::DelayTime.id(), 10.0).unwrap();
        fx.allocate_render_resources().unwrap();

        assert!(fx.is_allocated());
        assert_eq!(fx.kernel().state(), KernelState::Ready);
        assert_eq!(fx.kernel().get_parameter(0).unwrap(), 10.0);
    }

    #[test]
    fn test_render_requires_allocation() {
        let mut fx = instance();
        let mut out = BufferListStorage::<2>::new();
        let call = RenderCall::new(64, out.as_mut_ptr());
        // SAFETY: live output list.
        let status = unsafe { fx.render(&call, &mut silence) };
        assert_eq!(status, os_status::K_AUDIO_UNIT_ERR_UNINITIALIZED);
    }

    #[test]
    fn test_silent_quantum_with_no_feedback() {
        let mut fx = instance();
        fx.tree().set_value(EffectParameter::DelayFeedback.id(), 0.0).unwrap();
        fx.allocate_render_resources().unwrap();

        let mut left = vec![1.0f32; 512];
        let mut right = vec![1.0f32; 512];
        let mut out = BufferListStorage::<2>::new();
        out.buffers_mut()[0].attach(&mut left, 1);
        out.buffers_mut()[1].attach(&mut right, 1);

        let mut zero_fill =
            |_: &mut u32, _: &AudioTimeStamp, _: u32, _: isize, list: &mut AudioBufferList| {
                for i in 0..list.number_buffers {
                    // SAFETY: the bridge's list holds number_buffers buffers.
                    let buffer = unsafe { list.buffer_at_mut(i) };
                    let len = buffer.data_byte_size as usize / 4;
                    // SAFETY: the bridge attached `len` samples.
                    unsafe { std::slice::from_raw_parts_mut(buffer.data as *mut f32, len) }
                        .fill(0.0);
                }
                os_status::NO_ERR
            };
        let call = RenderCall::new(512, out.as_mut_ptr());
        // SAFETY: live output list.
        let status = unsafe { fx.render(&call, &mut zero_fill) };

        assert_eq!(status, os_status::NO_ERR);
        assert!(left.iter().chain(right.iter()).all(|&s| s == 0.0));
        assert_eq!(fx.last_render_stage(), Some(RenderStage::Delivered));
    }

    #[test]
    fn test_deallocate_keeps_kernel() {
        let mut fx = instance();
        fx.allocate_render_resources().unwrap();
        fx.deallocate_render_resources().unwrap();
        assert!(!fx.is_allocated());
        assert_eq!(fx.kernel().state(), KernelState::Ready);
        fx.deallocate_render_resources().unwrap();
        fx.reset().unwrap();
    }

    #[test]
    fn test_destroy_then_operate() {
        let mut fx = instance();
        fx.allocate_render_resources().unwrap();
        fx.destroy().unwrap();
        assert!(fx.is_destroyed());
        assert!(!fx.is_allocated());

        assert!(matches!(
            fx.allocate_render_resources(),
            Err(PluginError::LifecycleViolation { .. })
        ));
        assert!(fx.reset().is_err());
        assert!(fx.set_output_format(StreamFormat::new(44_100.0, 2)).is_err());
        assert_eq!(
            fx.destroy(),
            Err(PluginError::LifecycleViolation {
                operation: "destroy",
                state: "destroyed",
            })
        );
    }

    #[test]
    fn test_ui_writes_during_rendering() {
        const QUANTA: usize = 1000;
        const FRAMES: usize = 64;
        let feedback = EffectParameter::DelayFeedback.id();

        let mut fx = instance();
        fx.set_maximum_frames_to_render(FRAMES as u32).unwrap();
        fx.allocate_render_resources().unwrap();

        let tree = Arc::clone(fx.tree());
        let writer = std::thread::spawn(move || {
            for i in 0..QUANTA {
                let value = if i + 1 == QUANTA { 0.25 } else { (i % 20) as f32 * 0.05 };
                tree.set_value(feedback, value).unwrap();
            }
        });

        let mut left = vec![0.0f32; FRAMES];
        let mut right = vec![0.0f32; FRAMES];
        let mut out = BufferListStorage::<2>::new();
        out.buffers_mut()[0].attach(&mut left, 1);
        out.buffers_mut()[1].attach(&mut right, 1);
        let call = RenderCall::new(FRAMES as u32, out.as_mut_ptr());
        let mut impulse_train =
            |_: &mut u32, _: &AudioTimeStamp, frames: u32, _: isize, list: &mut AudioBufferList| {
                for i in 0..list.number_buffers {
                    // SAFETY: the bridge's list holds number_buffers buffers.
                    let buffer = unsafe { list.buffer_at_mut(i) };
                    // SAFETY: the bridge attached `frames` samples per buffer.
                    let samples = unsafe {
                        std::slice::from_raw_parts_mut(buffer.data as *mut f32, frames as usize)
                    };
                    samples.fill(0.0);
                    samples[0] = 1.0;
                }
                os_status::NO_ERR
            };

        for _ in 0..QUANTA {
            // SAFETY: live output list.
            let status = unsafe { fx.render(&call, &mut impulse_train) };
            assert_eq!(status, os_status::NO_ERR);
            assert!(left.iter().chain(right.iter()).all(|s| s.is_finite()));
        }
        writer.join().unwrap();

        // The last write reaches the kernel at the next quantum boundary.
        // SAFETY: live output list.
        let status = unsafe { fx.render(&call, &mut impulse_train) };
        assert_eq!(status, os_status::NO_ERR);
        assert_eq!(fx.tree().get_value(feedback).unwrap(), 0.25);
        assert_eq!(fx.kernel().get_parameter(feedback).unwrap(), 0.25);
    }

    #[test]
    fn test_state_round_trip() {
        let mut source = instance();
        source.tree().set_value(EffectParameter::ShimmerPitch.id(), -7.0).unwrap();
        let bytes = source.full_state().unwrap();

        let mut target = instance();
        assert_eq!(target.set_full_state(&bytes).unwrap(), EffectParameter::COUNT);
        assert_eq!(
            target.tree().get_value(EffectParameter::ShimmerPitch.id()).unwrap(),
            -7.0
        );
        assert_eq!(target.kernel().get_parameter(6).unwrap(), -7.0);
        assert!(target.set_full_state(b"not json").is_err());
    }

    #[test]
    fn test_factory_failure_is_fatal() {
        let result = EffectInstance::new(&CONFIG, || {
            Err(PluginError::ResourceAllocationFailure("no memory".into()))
        });
        assert!(matches!(
            result,
            Err(PluginError::ResourceAllocationFailure(_))
        ));
    }
}
