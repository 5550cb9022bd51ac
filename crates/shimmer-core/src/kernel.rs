//! DSP core contract and its lifecycle wrapper.
//!
//! [`DspCore`] is what the render bridge expects from whatever produces the
//! effect's samples. [`KernelHandle`] owns exactly one core and enforces the
//! order in which the host may drive it:
//!
//! ```text
//! Uninitialized --initialize--> Ready --process--> Processing --> Ready
//!        \                        |  ^--initialize / reset--'
//!         `------destroy----------+-------> Destroyed
//! ```
//!
//! Operations in the wrong state are lifecycle violations: they are logged,
//! panic in debug builds and return [`PluginError::LifecycleViolation`] in release
//! builds.

use crate::error::{PluginError, PluginResult};
use crate::types::{ParameterId, ParameterValue};

/// The opaque signal-processing core.
///
/// Implementations are driven from two contexts. `initialize` may allocate and is
/// only ever called while rendering is stopped. `set_parameter`, `get_parameter`
/// and `process` run on the render thread and must complete in bounded time
/// without allocating, locking or doing I/O.
pub trait DspCore: Send {
    /// Prepare for `channel_count` channels at `sample_rate`.
    ///
    /// May be called again with a new format; the core re-sizes itself.
    fn initialize(&mut self, channel_count: u32, sample_rate: f64) -> PluginResult<()>;

    /// Clear delay lines and filter state without releasing memory.
    fn reset(&mut self);

    /// Apply a plain value. Values arrive already clamped to the catalog range.
    fn set_parameter(&mut self, id: ParameterId, value: ParameterValue);

    /// Current plain value.
    fn get_parameter(&self, id: ParameterId) -> ParameterValue;

    /// Process one quantum.
    ///
    /// All four slices have the same length. For mono formats the bridge passes
    /// the same samples as both inputs.
    fn process(
        &mut self,
        input_left: &[f32],
        input_right: &[f32],
        output_left: &mut [f32],
        output_right: &mut [f32],
    );
}

/// Lifecycle state of a [`KernelHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    /// Core constructed, not yet initialized.
    Uninitialized,
    /// Initialized and idle.
    Ready,
    /// Inside `process`.
    Processing,
    /// Core released. Terminal.
    Destroyed,
}

impl KernelState {
    /// Lowercase name used in diagnostics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Processing => "processing",
            Self::Destroyed => "destroyed",
        }
    }
}

/// Owns one [`DspCore`] and sequences its lifecycle.
pub struct KernelHandle {
    core: Option<Box<dyn DspCore>>,
    state: KernelState,
    channel_count: u32,
    sample_rate: f64,
}

impl KernelHandle {
    /// Build the core.
    ///
    /// Any factory failure is reported as `ResourceAllocationFailure`.
    pub fn create<F>(factory: F) -> PluginResult<Self>
    where
        F: FnOnce() -> PluginResult<Box<dyn DspCore>>,
    {
        let core = factory().map_err(|e| match e {
            PluginError::ResourceAllocationFailure(_) => e,
            other => PluginError::ResourceAllocationFailure(other.to_string()),
        })?;

        log::debug!("DSP core created");

        Ok(Self {
            core: Some(core),
            state: KernelState::Uninitialized,
            channel_count: 0,
            sample_rate: 0.0,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> KernelState {
        self.state
    }

    /// Channel count of the last successful `initialize`, or 0.
    pub fn channel_count(&self) -> u32 {
        self.channel_count
    }

    /// Sample rate of the last successful `initialize`, or 0.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Whether `process` may be called.
    pub fn is_ready(&self) -> bool {
        self.state == KernelState::Ready
    }

    /// Prepare the core for a format.
    ///
    /// Re-initializing a ready handle re-sizes the same core.
    pub fn initialize(&mut self, channel_count: u32, sample_rate: f64) -> PluginResult<()> {
        if !matches!(self.state, KernelState::Uninitialized | KernelState::Ready) {
            return Err(self.violation("initialize"));
        }

        if !(1..=2).contains(&channel_count) {
            return Err(PluginError::ResourceAllocationFailure(format!(
                "unsupported channel count {} (expected 1 or 2)",
                channel_count
            )));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(PluginError::ResourceAllocationFailure(format!(
                "invalid sample rate {}",
                sample_rate
            )));
        }

        let core = self.core_mut("initialize")?;
        core.initialize(channel_count, sample_rate)?;

        log::debug!(
            "DSP core initialized: {} channel(s) at {} Hz",
            channel_count,
            sample_rate
        );

        self.channel_count = channel_count;
        self.sample_rate = sample_rate;
        self.state = KernelState::Ready;
        Ok(())
    }

    /// Clear the core's internal state. Resources stay allocated.
    pub fn reset(&mut self) -> PluginResult<()> {
        if self.state == KernelState::Processing {
            return Err(self.violation("reset"));
        }
        self.core_mut("reset")?.reset();
        Ok(())
    }

    /// Forward a clamped value to the core.
    #[inline]
    pub fn set_parameter(&mut self, id: ParameterId, value: ParameterValue) -> PluginResult<()> {
        self.core_mut("set_parameter")?.set_parameter(id, value);
        Ok(())
    }

    /// Read a value back from the core.
    #[inline]
    pub fn get_parameter(&self, id: ParameterId) -> PluginResult<ParameterValue> {
        match &self.core {
            Some(core) => Ok(core.get_parameter(id)),
            None => Err(self.violation("get_parameter")),
        }
    }

    /// Run one quantum through the core.
    ///
    /// Only valid in `Ready`. All four slices must have the same length.
    #[inline]
    pub fn process(
        &mut self,
        input_left: &[f32],
        input_right: &[f32],
        output_left: &mut [f32],
        output_right: &mut [f32],
    ) -> PluginResult<()> {
        if self.state != KernelState::Ready {
            return Err(self.violation("process"));
        }

        debug_assert!(
            input_left.len() == output_left.len()
                && input_right.len() == output_left.len()
                && output_right.len() == output_left.len(),
            "channel runs must have equal length"
        );

        self.state = KernelState::Processing;
        if let Some(core) = self.core.as_mut() {
            core.process(input_left, input_right, output_left, output_right);
        }
        self.state = KernelState::Ready;
        Ok(())
    }

    /// Release the core. Any later operation is a lifecycle violation.
    pub fn destroy(&mut self) -> PluginResult<()> {
        if matches!(self.state, KernelState::Destroyed | KernelState::Processing) {
            return Err(self.violation("destroy"));
        }
        self.core = None;
        self.state = KernelState::Destroyed;
        log::debug!("DSP core destroyed");
        Ok(())
    }

    fn core_mut(&mut self, operation: &'static str) -> PluginResult<&mut Box<dyn DspCore>> {
        let state = self.state;
        self.core
            .as_mut()
            .ok_or_else(|| lifecycle_violation(operation, state))
    }

    #[cold]
    fn violation(&self, operation: &'static str) -> PluginError {
        lifecycle_violation(operation, self.state)
    }
}

/// Log a lifecycle violation and panic in debug builds.
#[cold]
fn lifecycle_violation(operation: &'static str, state: KernelState) -> PluginError {
    let error = PluginError::LifecycleViolation {
        operation,
        state: state.as_str(),
    };
    log::error!("{}", error);
    debug_assert!(false, "{}", error);
    error
}

impl Drop for KernelHandle {
    fn drop(&mut self) {
        if self.core.take().is_some() {
            log::debug!("DSP core released on drop");
        }
    }
}

impl std::fmt::Debug for KernelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelHandle")
            .field("state", &self.state)
            .field("channel_count", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        drops: AtomicUsize,
    }

    struct RecordingCore {
        recorder: Arc<Recorder>,
        values: [f32; 8],
    }

    impl RecordingCore {
        fn boxed(recorder: &Arc<Recorder>) -> PluginResult<Box<dyn DspCore>> {
            Ok(Box::new(Self {
                recorder: Arc::clone(recorder),
                values: [0.0; 8],
            }))
        }

        fn record(&self, call: String) {
            self.recorder.calls.lock().unwrap().push(call);
        }
    }

    impl DspCore for RecordingCore {
        fn initialize(&mut self, channel_count: u32, sample_rate: f64) -> PluginResult<()> {
            self.record(format!("initialize({}, {})", channel_count, sample_rate));
            Ok(())
        }

        fn reset(&mut self) {
            self.record("reset".to_string());
        }

        fn set_parameter(&mut self, id: ParameterId, value: ParameterValue) {
            self.values[id as usize] = value;
        }

        fn get_parameter(&self, id: ParameterId) -> ParameterValue {
            self.values[id as usize]
        }

        fn process(&mut self, il: &[f32], ir: &[f32], ol: &mut [f32], or: &mut [f32]) {
            ol.copy_from_slice(il);
            or.copy_from_slice(ir);
        }
    }

    impl Drop for RecordingCore {
        fn drop(&mut self) {
            self.recorder.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn handle(recorder: &Arc<Recorder>) -> KernelHandle {
        KernelHandle::create(|| RecordingCore::boxed(recorder)).unwrap()
    }

    #[test]
    fn test_create_failure_is_allocation_failure() {
        let result = KernelHandle::create(|| Err(PluginError::State("no memory".into())));
        assert!(matches!(
            result.unwrap_err(),
            PluginError::ResourceAllocationFailure(msg) if msg.contains("no memory")
        ));
    }

    #[test]
    fn test_initialize_twice_reuses_core() {
        let recorder = Arc::new(Recorder::default());
        let mut kernel = handle(&recorder);
        assert_eq!(kernel.state(), KernelState::Uninitialized);

        kernel.initialize(2, 44_100.0).unwrap();
        kernel.initialize(2, 48_000.0).unwrap();

        assert_eq!(kernel.state(), KernelState::Ready);
        assert_eq!(kernel.sample_rate(), 48_000.0);
        assert_eq!(recorder.drops.load(Ordering::SeqCst), 0);
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["initialize(2, 44100)", "initialize(2, 48000)"]
        );
    }

    #[test]
    fn test_initialize_rejects_bad_formats() {
        let recorder = Arc::new(Recorder::default());
        let mut kernel = handle(&recorder);
        assert!(kernel.initialize(0, 44_100.0).is_err());
        assert!(kernel.initialize(3, 44_100.0).is_err());
        assert!(kernel.initialize(2, 0.0).is_err());
        assert!(kernel.initialize(2, f64::NAN).is_err());
        assert_eq!(kernel.state(), KernelState::Uninitialized);
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_parameters_before_initialize() {
        let recorder = Arc::new(Recorder::default());
        let mut kernel = handle(&recorder);
        kernel.set_parameter(3, 0.25).unwrap();
        assert_eq!(kernel.get_parameter(3).unwrap(), 0.25);
    }

    #[test]
    fn test_process_and_reset() {
        let recorder = Arc::new(Recorder::default());
        let mut kernel = handle(&recorder);
        kernel.initialize(2, 44_100.0).unwrap();

        let input = [0.5f32; 16];
        let mut left = [0.0f32; 16];
        let mut right = [0.0f32; 16];
        kernel.process(&input, &input, &mut left, &mut right).unwrap();
        assert_eq!(left, input);
        assert_eq!(kernel.state(), KernelState::Ready);

        kernel.reset().unwrap();
        kernel.reset().unwrap();
        assert_eq!(recorder.calls.lock().unwrap().iter().filter(|c| *c == "reset").count(), 2);
    }

    #[test]
    fn test_destroy_releases_once_and_drop_is_quiet() {
        let recorder = Arc::new(Recorder::default());
        let mut kernel = handle(&recorder);
        kernel.destroy().unwrap();
        assert_eq!(kernel.state(), KernelState::Destroyed);
        drop(kernel);
        assert_eq!(recorder.drops.load(Ordering::SeqCst), 1);

        let kernel = handle(&recorder);
        drop(kernel);
        assert_eq!(recorder.drops.load(Ordering::SeqCst), 2);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "Lifecycle violation"))]
    fn test_process_before_initialize() {
        let recorder = Arc::new(Recorder::default());
        let mut kernel = handle(&recorder);
        let mut out = [0.0f32; 4];
        let mut out_r = [0.0f32; 4];
        let result = kernel.process(&[0.0; 4], &[0.0; 4], &mut out, &mut out_r);
        assert!(matches!(result, Err(PluginError::LifecycleViolation { operation: "process", .. })));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "Lifecycle violation"))]
    fn test_operation_after_destroy() {
        let recorder = Arc::new(Recorder::default());
        let mut kernel = handle(&recorder);
        kernel.destroy().unwrap();
        let result = kernel.reset();
        assert_eq!(
            result.unwrap_err(),
            PluginError::LifecycleViolation {
                operation: "reset",
                state: "destroyed"
            }
        );
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "Lifecycle violation"))]
    fn test_destroy_twice() {
        let recorder = Arc::new(Recorder::default());
        let mut kernel = handle(&recorder);
        kernel.destroy().unwrap();
        assert!(kernel.destroy().is_err());
        assert_eq!(recorder.drops.load(Ordering::SeqCst), 1);
    }
}
