//! Per-quantum render bridge.
//!
//! [`RenderBridge`] is created by `allocate_render_resources` and driven once per
//! host render call. Each quantum walks the stages
//! `AwaitInput → InputReady → Processed → Delivered`:
//!
//! 1. Reject oversized quanta, return early for empty ones
//! 2. Apply host automation events to the tree, then drain pending tree changes
//!    into the kernel
//! 3. Pull bus 0 input from the host
//! 4. Resolve input and output channel runs from the buffer lists
//! 5. Run the kernel and deliver the output
//!
//! All storage is sized when the bridge is built. Nothing on this path
//! allocates, locks or blocks.
//!
//! # Pull input
//!
//! The host hands over an `AURenderPullInputBlock`. [`BlockPullInput`] calls it
//! through the block literal's invoke pointer (see `objc_block`). Rust callers and
//! tests implement [`PullInput`] directly or pass a closure.

use std::ffi::c_void;
use std::ptr;
use std::slice;

use shimmer_core::{KernelHandle, ParameterAutomationTree, ParameterId, PendingChanges};

use crate::buffers::{
    byte_size, copy_in, deinterleave, interleave, runs_overlap, validate_f32_buffer,
    warn_unsupported_layout, AudioBuffer, AudioBufferList, BufferListStorage,
};
use crate::error::os_status;
use crate::lifecycle::StreamFormat;
use crate::objc_block;

/// Upper bound on render events walked per quantum.
const MAX_EVENTS_PER_BUFFER: usize = 4096;

// =============================================================================
// AU Render Event Types
// =============================================================================

/// AU render event types.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AURenderEventType {
    /// Parameter change
    Parameter = 1,
    /// Parameter ramp over time
    ParameterRamp = 2,
    /// MIDI 1.0 event
    Midi = 8,
    /// MIDI SysEx event
    MidiSysEx = 9,
}

/// Common header for all AU render events.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AURenderEventHeader {
    /// Next event in the list (null if last)
    pub next: *const AURenderEvent,
    /// Sample frame offset within this render call
    pub event_sample_time: i64,
    /// Event type discriminator
    pub event_type: u8,
    /// Reserved, must be 0
    pub reserved: u8,
}

/// Parameter event, shared by immediate changes and ramps.
///
/// Matches Core Audio's `AUParameterEvent`. For a ramp, `value` is the value
/// reached after `ramp_duration_sample_frames`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AUParameterEvent {
    pub next: *const AURenderEvent,
    pub event_sample_time: i64,
    pub event_type: u8,
    pub reserved: [u8; 3],
    /// Zero for an immediate change.
    pub ramp_duration_sample_frames: u32,
    pub parameter_address: u64,
    pub value: f32,
}

/// AU render event union.
///
/// Read `head.event_type` to find the active variant.
#[repr(C)]
pub union AURenderEvent {
    /// Common header (always safe to access)
    pub head: AURenderEventHeader,
    /// Parameter change or ramp event
    pub parameter: AUParameterEvent,
}

/// SMPTE time structure.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SMPTETime {
    pub subframes: i16,
    pub subframe_divisor: i16,
    pub counter: u32,
    pub smpte_type: u32,
    pub flags: u32,
    pub hours: i16,
    pub minutes: i16,
    pub seconds: i16,
    pub frames: i16,
}

/// Audio timestamp structure from Core Audio.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioTimeStamp {
    /// Sample time
    pub sample_time: f64,
    /// Host time (Mach absolute time)
    pub host_time: u64,
    /// Rate scalar
    pub rate_scalar: f64,
    /// Word clock time
    pub word_clock_time: u64,
    /// SMPTE time
    pub smpte_time: SMPTETime,
    /// Flags indicating which fields are valid
    pub flags: u32,
    /// Reserved
    pub reserved: u32,
}

/// Apply parameter and ramp events to the tree.
///
/// Ramps jump straight to their end value (the event's `value`). Other event
/// types are skipped.
/// Returns the number of parameter writes.
///
/// # Safety
/// `event_list` must be null or the head of a valid host event list.
pub unsafe fn apply_parameter_events(
    event_list: *const AURenderEvent,
    tree: &ParameterAutomationTree,
) -> usize {
    let mut event_ptr = event_list;
    let mut iterations = 0;
    let mut applied = 0;

    while !event_ptr.is_null() && iterations < MAX_EVENTS_PER_BUFFER {
        iterations += 1;
        // SAFETY: event_ptr is non-null and the list is valid for this render call.
        let event = unsafe { &*event_ptr };
        // SAFETY: the header is shared by every variant.
        let event_type = unsafe { event.head.event_type };

        let write = match event_type {
            t if t == AURenderEventType::Parameter as u8
                || t == AURenderEventType::ParameterRamp as u8 =>
            {
                // SAFETY: event_type says the parameter variant is active.
                let parameter = unsafe { &event.parameter };
                Some((parameter.parameter_address, parameter.value))
            }
            _ => None,
        };

        if let Some((address, value)) = write {
            // Addresses past u32 are unknown ids; the tree counts and drops them.
            let id = ParameterId::try_from(address).unwrap_or(ParameterId::MAX);
            if tree.set_value(id, value).is_ok() {
                applied += 1;
            }
        }

        // SAFETY: head.next is valid or null.
        event_ptr = unsafe { event.head.next };
    }

    if iterations >= MAX_EVENTS_PER_BUFFER {
        log::warn!(
            "Render event list exceeded maximum iterations ({}), possible corruption",
            MAX_EVENTS_PER_BUFFER
        );
    }

    applied
}

// =============================================================================
// Pull Input
// =============================================================================

/// Source of the effect's input audio for one quantum.
///
/// Mirrors `AURenderPullInputBlock`: fill `input` with `frame_count` frames for
/// `bus` and return an OSStatus. The implementation may write into the data
/// pointers already in the list or replace them with its own buffers, which must
/// stay valid until the render call returns.
pub trait PullInput {
    fn pull(
        &mut self,
        action_flags: &mut u32,
        timestamp: &AudioTimeStamp,
        frame_count: u32,
        bus: isize,
        input: &mut AudioBufferList,
    ) -> i32;
}

impl<F> PullInput for F
where
    F: FnMut(&mut u32, &AudioTimeStamp, u32, isize, &mut AudioBufferList) -> i32,
{
    fn pull(
        &mut self,
        action_flags: &mut u32,
        timestamp: &AudioTimeStamp,
        frame_count: u32,
        bus: isize,
        input: &mut AudioBufferList,
    ) -> i32 {
        self(action_flags, timestamp, frame_count, bus, input)
    }
}

/// Function signature behind an `AURenderPullInputBlock`'s invoke pointer.
type AURenderPullInputBlock = unsafe extern "C" fn(
    block: *const c_void,
    action_flags: *mut u32,
    timestamp: *const AudioTimeStamp,
    frame_count: u32,
    input_bus_number: isize,
    input_data: *mut AudioBufferList,
) -> i32;

/// The host's pull-input block.
pub struct BlockPullInput {
    block: *const c_void,
}

impl BlockPullInput {
    /// Wrap a host block. Returns `None` for null.
    ///
    /// # Safety
    /// `block` must be a valid `AURenderPullInputBlock` for as long as the
    /// wrapper is used. Only use it within the render call that supplied it.
    pub unsafe fn new(block: *const c_void) -> Option<Self> {
        (!block.is_null()).then_some(Self { block })
    }
}

impl PullInput for BlockPullInput {
    fn pull(
        &mut self,
        action_flags: &mut u32,
        timestamp: &AudioTimeStamp,
        frame_count: u32,
        bus: isize,
        input: &mut AudioBufferList,
    ) -> i32 {
        // SAFETY: `new` requires a valid block for the duration of the render
        // call. The signature matches Apple's AURenderPullInputBlock, and the
        // block pointer is passed as the first argument as blocks expect.
        unsafe {
            let invoke = objc_block::invoke_ptr(self.block);
            let pull_fn: AURenderPullInputBlock = std::mem::transmute(invoke);
            pull_fn(self.block, action_flags, timestamp, frame_count, bus, input)
        }
    }
}

/// Pull source that reports "no connection".
///
/// Used when the host renders without supplying a pull block.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInput;

impl PullInput for NoInput {
    fn pull(&mut self, _: &mut u32, _: &AudioTimeStamp, _: u32, _: isize, _: &mut AudioBufferList) -> i32 {
        os_status::K_AUDIO_UNIT_ERR_NO_CONNECTION
    }
}

// =============================================================================
// Render Bridge
// =============================================================================

/// Last stage a quantum reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    /// Pull requested, input not yet available.
    AwaitInput,
    /// Input and output runs resolved.
    InputReady,
    /// Kernel has processed the quantum.
    Processed,
    /// Output written to the host's buffers.
    Delivered,
}

/// Arguments of one host render call.
#[derive(Debug, Clone, Copy)]
pub struct RenderCall {
    /// AudioUnitRenderActionFlags, may be null.
    pub action_flags: *mut u32,
    /// Timestamp for this quantum, may be null.
    pub timestamp: *const AudioTimeStamp,
    pub frame_count: u32,
    /// Output bus. Only bus 0 exists.
    pub output_bus: isize,
    /// Host output buffer list.
    pub output: *mut AudioBufferList,
    /// Realtime event list, may be null.
    pub events: *const AURenderEvent,
}

impl RenderCall {
    /// A call for bus 0 with no flags, timestamp or events.
    pub fn new(frame_count: u32, output: *mut AudioBufferList) -> Self {
        Self {
            action_flags: ptr::null_mut(),
            timestamp: ptr::null(),
            frame_count,
            output_bus: 0,
            output,
            events: ptr::null(),
        }
    }

    /// Attach a realtime event list.
    pub fn with_events(mut self, events: *const AURenderEvent) -> Self {
        self.events = events;
        self
    }
}

/// Channel runs for one quantum, borrowed for the duration of `process`.
pub struct RenderQuantumView<'a> {
    pub frame_count: usize,
    pub input: [&'a [f32]; 2],
    pub output: [&'a mut [f32]; 2],
}

impl RenderQuantumView<'_> {
    fn process(self, kernel: &mut KernelHandle) -> i32 {
        let [left, right] = self.output;
        match kernel.process(self.input[0], self.input[1], left, right) {
            Ok(()) => os_status::NO_ERR,
            Err(e) => {
                log::error!("Kernel refused to process: {}", e);
                os_status::K_AUDIO_UNIT_ERR_CANNOT_DO_IN_CURRENT_CONTEXT
            }
        }
    }
}

/// Where the output of a quantum goes.
#[derive(Clone, Copy)]
enum OutputTarget {
    /// One run per channel.
    Planar { left: *mut f32, right: *mut f32 },
    /// Single channel; the right side is computed into scratch and dropped.
    Mono { left: *mut f32 },
    /// Single interleaved stereo run.
    Interleaved { data: *mut f32 },
}

/// Pre-allocated render state for one allocation of render resources.
pub struct RenderBridge {
    format: StreamFormat,
    max_frames: u32,
    /// Buffer list handed to the host's pull block.
    pull_list: BufferListStorage<2>,
    /// Pull target, two halves for planar input or one interleaved run.
    pull_storage: Vec<f32>,
    input_left: Vec<f32>,
    input_right: Vec<f32>,
    /// Internal output storage and de-interleave scratch.
    output_left: Vec<f32>,
    output_right: Vec<f32>,
    /// Internal storage for null interleaved output.
    output_interleaved: Vec<f32>,
    last_stage: Option<RenderStage>,
}

// SAFETY: the raw pointers in `pull_list` only ever point into this bridge's own
// vectors or at host memory for the duration of one render call.
unsafe impl Send for RenderBridge {}

impl RenderBridge {
    /// Allocate storage for `max_frames` frames of `format`.
    pub fn new(format: StreamFormat, max_frames: u32) -> Self {
        let frames = max_frames as usize;
        Self {
            format,
            max_frames,
            pull_list: BufferListStorage::new(),
            pull_storage: vec![0.0; frames * 2],
            input_left: vec![0.0; frames],
            input_right: vec![0.0; frames],
            output_left: vec![0.0; frames],
            output_right: vec![0.0; frames],
            output_interleaved: vec![0.0; frames * 2],
            last_stage: None,
        }
    }

    /// Stream format the storage was sized for.
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Largest quantum accepted.
    pub fn max_frames(&self) -> u32 {
        self.max_frames
    }

    /// Last stage reached by the most recent non-empty quantum.
    pub fn last_stage(&self) -> Option<RenderStage> {
        self.last_stage
    }

    /// Render one quantum.
    ///
    /// Returns an OSStatus. A failed pull returns the host's status unchanged and
    /// leaves the output list untouched.
    ///
    /// # Safety
    /// Every non-null pointer in `call` must be valid for the duration of the
    /// call, and the output list must hold `number_buffers` buffers whose non-null
    /// data pointers cover their `data_byte_size`.
    pub unsafe fn render<P: PullInput + ?Sized>(
        &mut self,
        kernel: &mut KernelHandle,
        tree: &ParameterAutomationTree,
        pending: &PendingChanges,
        call: &RenderCall,
        pull: &mut P,
    ) -> i32 {
        if call.output.is_null() {
            return os_status::K_AUDIO_UNIT_ERR_INVALID_PARAMETER;
        }
        if call.output_bus != 0 {
            return os_status::K_AUDIO_UNIT_ERR_INVALID_ELEMENT;
        }
        if call.frame_count > self.max_frames {
            return os_status::K_AUDIO_UNIT_ERR_TOO_MANY_FRAMES_TO_PROCESS;
        }
        if call.frame_count == 0 {
            return os_status::NO_ERR;
        }

        // SAFETY: events list validity is the caller's contract.
        unsafe { apply_parameter_events(call.events, tree) };
        pending.drain(|id| {
            if let Ok(value) = tree.get_value(id) {
                // Only fails after destroy, which cannot overlap a render.
                let _ = kernel.set_parameter(id, value);
            }
        });

        self.last_stage = Some(RenderStage::AwaitInput);
        let status = self.pull_input(call, pull);
        if status != os_status::NO_ERR {
            return status;
        }

        let frames = call.frame_count as usize;
        if !self.resolve_input(frames) {
            warn_unsupported_layout();
            return os_status::K_AUDIO_UNIT_ERR_FORMAT_NOT_SUPPORTED;
        }
        // SAFETY: call.output is non-null and valid per the caller's contract.
        let output = unsafe { &mut *call.output };
        let Some(target) = self.resolve_output(output, frames) else {
            warn_unsupported_layout();
            return os_status::K_AUDIO_UNIT_ERR_FORMAT_NOT_SUPPORTED;
        };
        self.last_stage = Some(RenderStage::InputReady);

        let input = [&self.input_left[..frames], &self.input_right[..frames]];
        let status = match target {
            OutputTarget::Planar { left, right } => {
                // SAFETY: both runs validated for `frames` samples, non-overlapping,
                // and distinct from the input vectors.
                let view = unsafe {
                    RenderQuantumView {
                        frame_count: frames,
                        input,
                        output: [
                            slice::from_raw_parts_mut(left, frames),
                            slice::from_raw_parts_mut(right, frames),
                        ],
                    }
                };
                view.process(kernel)
            }
            OutputTarget::Mono { left } => {
                // SAFETY: validated for `frames` samples and distinct from
                // output_right.
                let view = unsafe {
                    RenderQuantumView {
                        frame_count: frames,
                        input,
                        output: [
                            slice::from_raw_parts_mut(left, frames),
                            &mut self.output_right[..frames],
                        ],
                    }
                };
                view.process(kernel)
            }
            OutputTarget::Interleaved { .. } => RenderQuantumView {
                frame_count: frames,
                input,
                output: [
                    &mut self.output_left[..frames],
                    &mut self.output_right[..frames],
                ],
            }
            .process(kernel),
        };
        if status != os_status::NO_ERR {
            return status;
        }
        self.last_stage = Some(RenderStage::Processed);

        if let OutputTarget::Interleaved { data } = target {
            // SAFETY: validated for `frames * 2` samples; distinct from the
            // planar scratch it is filled from.
            let interleaved = unsafe { slice::from_raw_parts_mut(data, frames * 2) };
            interleave(
                &self.output_left[..frames],
                &self.output_right[..frames],
                interleaved,
            );
        }
        self.last_stage = Some(RenderStage::Delivered);

        os_status::NO_ERR
    }

    /// Point the pull list at internal storage and call the host.
    fn pull_input<P: PullInput + ?Sized>(&mut self, call: &RenderCall, pull: &mut P) -> i32 {
        let frames = call.frame_count as usize;
        let max = self.max_frames as usize;

        if self.format.channel_count == 1 {
            self.pull_list.set_len(1);
            self.pull_list.buffers_mut()[0].attach(&mut self.pull_storage[..frames], 1);
        } else if self.format.interleaved {
            self.pull_list.set_len(1);
            self.pull_list.buffers_mut()[0].attach(&mut self.pull_storage[..frames * 2], 2);
        } else {
            self.pull_list.set_len(2);
            let (left, right) = self.pull_storage.split_at_mut(max);
            let buffers = self.pull_list.buffers_mut();
            buffers[0].attach(&mut left[..frames], 1);
            buffers[1].attach(&mut right[..frames], 1);
        }

        let mut local_flags = 0;
        // SAFETY: non-null action_flags is valid per the render contract.
        let action_flags = unsafe { call.action_flags.as_mut() }.unwrap_or(&mut local_flags);
        let fallback = AudioTimeStamp::default();
        // SAFETY: non-null timestamp is valid per the render contract.
        let timestamp = unsafe { call.timestamp.as_ref() }.unwrap_or(&fallback);

        pull.pull(
            action_flags,
            timestamp,
            call.frame_count,
            0,
            self.pull_list.as_list_mut(),
        )
    }

    /// Copy pulled audio into the input runs. Returns `false` for unsupported
    /// layouts.
    fn resolve_input(&mut self, frames: usize) -> bool {
        // The host may have rewritten the count; only the first two slots exist.
        let count = (self.pull_list.as_list().number_buffers as usize).min(2);
        self.pull_list.set_len(count);
        let buffers = self.pull_list.buffers();

        match buffers {
            [only] if only.number_channels == 1 => {
                if !validate_f32_buffer(only, frames) {
                    return false;
                }
                // SAFETY: validated for `frames` samples.
                unsafe { copy_in(only.data as *const f32, &mut self.input_left[..frames]) };
                self.input_right[..frames].copy_from_slice(&self.input_left[..frames]);
                true
            }
            [only] if only.number_channels == 2 => {
                if !validate_f32_buffer(only, frames * 2) {
                    return false;
                }
                // SAFETY: validated for `frames * 2` samples; points at pull
                // storage or host memory, never at the input runs.
                let interleaved =
                    unsafe { slice::from_raw_parts(only.data as *const f32, frames * 2) };
                deinterleave(
                    interleaved,
                    &mut self.input_left[..frames],
                    &mut self.input_right[..frames],
                );
                true
            }
            [left, right] if left.number_channels == 1 && right.number_channels == 1 => {
                if !(validate_f32_buffer(left, frames) && validate_f32_buffer(right, frames)) {
                    return false;
                }
                // SAFETY: both validated for `frames` samples.
                unsafe {
                    copy_in(left.data as *const f32, &mut self.input_left[..frames]);
                    copy_in(right.data as *const f32, &mut self.input_right[..frames]);
                }
                true
            }
            _ => false,
        }
    }

    /// Validate the host output list, pointing null buffers at internal storage.
    ///
    /// Every buffer is checked before any is attached, so a rejected list is
    /// left as the host passed it.
    fn resolve_output(&mut self, output: &mut AudioBufferList, frames: usize) -> Option<OutputTarget> {
        match output.number_buffers {
            1 => {
                // SAFETY: the list holds one buffer.
                let buffer = unsafe { output.buffer_at_mut(0) };
                match buffer.number_channels {
                    1 if run_is_usable(buffer, frames) => {
                        let left = attach_if_null(buffer, &mut self.output_left[..frames], 1);
                        Some(OutputTarget::Mono { left })
                    }
                    2 if run_is_usable(buffer, frames * 2) => {
                        let data =
                            attach_if_null(buffer, &mut self.output_interleaved[..frames * 2], 2);
                        Some(OutputTarget::Interleaved { data })
                    }
                    _ => None,
                }
            }
            n if n >= 2 => {
                // SAFETY: the list holds at least two buffers.
                let (first, second) = unsafe {
                    let first: *mut AudioBuffer = output.buffer_at_mut(0);
                    let second: *mut AudioBuffer = output.buffer_at_mut(1);
                    (&mut *first, &mut *second)
                };
                if first.number_channels != 1 || second.number_channels != 1 {
                    return None;
                }
                if !(run_is_usable(first, frames) && run_is_usable(second, frames)) {
                    return None;
                }
                // Internal runs never alias each other or host memory.
                if !first.data.is_null()
                    && !second.data.is_null()
                    && runs_overlap(first.data as *const f32, second.data as *const f32, frames)
                {
                    return None;
                }
                let left = attach_if_null(first, &mut self.output_left[..frames], 1);
                let right = attach_if_null(second, &mut self.output_right[..frames], 1);
                Some(OutputTarget::Planar { left, right })
            }
            _ => None,
        }
    }
}

/// Whether an output buffer can carry `samples`: null (filled from internal
/// storage) or a valid f32 run.
fn run_is_usable(buffer: &AudioBuffer, samples: usize) -> bool {
    buffer.data.is_null() || validate_f32_buffer(buffer, samples)
}

/// Output run for one checked buffer: its own data, or internal storage if null.
fn attach_if_null(buffer: &mut AudioBuffer, internal: &mut [f32], number_channels: u32) -> *mut f32 {
    if buffer.data.is_null() {
        buffer.attach(internal, number_channels);
    }
    debug_assert!(buffer.data_byte_size >= byte_size(internal.len()));
    buffer.data as *mut f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use shimmer_core::{
        DspCore, EffectParameter, ParameterCatalog, ParameterValue, PluginResult,
    };

    /// Output = input * gain, gain bound to the dry/wet parameter.
    struct GainCore {
        gain: f32,
    }

    impl DspCore for GainCore {
        fn initialize(&mut self, _: u32, _: f64) -> PluginResult<()> {
            Ok(())
        }
        fn reset(&mut self) {}
        fn set_parameter(&mut self, id: ParameterId, value: ParameterValue) {
            if id == EffectParameter::DryWet.id() {
                self.gain = value;
            }
        }
        fn get_parameter(&self, _: ParameterId) -> ParameterValue {
            self.gain
        }
        fn process(&mut self, il: &[f32], ir: &[f32], ol: &mut [f32], or: &mut [f32]) {
            for (o, i) in ol.iter_mut().zip(il) {
                *o = i * self.gain;
            }
            for (o, i) in or.iter_mut().zip(ir) {
                *o = i * self.gain;
            }
        }
    }

    struct Fixture {
        kernel: KernelHandle,
        tree: ParameterAutomationTree,
        pending: Arc<PendingChanges>,
        bridge: RenderBridge,
    }

    impl Fixture {
        fn new(format: StreamFormat, max_frames: u32) -> Self {
            let pending = Arc::new(PendingChanges::new());
            let sink = Arc::clone(&pending);
            let tree = ParameterAutomationTree::new(ParameterCatalog::effect())
                .unwrap()
                .with_value_observer(move |id, _| sink.mark(id));
            let mut kernel =
                KernelHandle::create(|| Ok(Box::new(GainCore { gain: 1.0 }) as Box<dyn DspCore>))
                    .unwrap();
            kernel
                .initialize(format.channel_count, format.sample_rate)
                .unwrap();
            pending.mark_all(tree.len());
            Self {
                kernel,
                tree,
                pending,
                bridge: RenderBridge::new(format, max_frames),
            }
        }

        fn render<P: PullInput>(&mut self, call: &RenderCall, pull: &mut P) -> i32 {
            // SAFETY: tests pass live output lists and event chains.
            unsafe {
                self.bridge
                    .render(&mut self.kernel, &self.tree, &self.pending, call, pull)
            }
        }
    }

    fn stereo() -> StreamFormat {
        StreamFormat::new(44_100.0, 2)
    }

    /// Pull closure filling every buffer in place with `value(frame_index)`.
    fn fill_with(
        value: impl Fn(usize) -> f32,
    ) -> impl FnMut(&mut u32, &AudioTimeStamp, u32, isize, &mut AudioBufferList) -> i32 {
        move |_, _, _, bus, list| {
            assert_eq!(bus, 0);
            for i in 0..list.number_buffers {
                // SAFETY: the bridge's list holds number_buffers buffers.
                let buffer = unsafe { list.buffer_at_mut(i) };
                let len = buffer.data_byte_size as usize / 4;
                // SAFETY: the bridge attached `len` samples of storage.
                let samples = unsafe { slice::from_raw_parts_mut(buffer.data as *mut f32, len) };
                for (n, s) in samples.iter_mut().enumerate() {
                    *s = value(n);
                }
            }
            os_status::NO_ERR
        }
    }

    #[test]
    fn test_planar_render_applies_default_gain() {
        let mut fx = Fixture::new(stereo(), 512);
        let mut left = vec![9.0f32; 64];
        let mut right = vec![9.0f32; 64];
        let mut out = BufferListStorage::<2>::new();
        out.buffers_mut()[0].attach(&mut left, 1);
        out.buffers_mut()[1].attach(&mut right, 1);

        let call = RenderCall::new(64, out.as_mut_ptr());
        assert_eq!(fx.render(&call, &mut fill_with(|_| 1.0)), os_status::NO_ERR);

        assert!(left.iter().chain(right.iter()).all(|&s| s == 0.5));
        assert_eq!(fx.bridge.last_stage(), Some(RenderStage::Delivered));
    }

    #[test]
    fn test_pull_failure_leaves_output_untouched() {
        let mut fx = Fixture::new(stereo(), 512);
        let mut left = vec![7.0f32; 32];
        let mut right = vec![7.0f32; 32];
        let mut out = BufferListStorage::<2>::new();
        out.buffers_mut()[0].attach(&mut left, 1);
        out.buffers_mut()[1].attach(&mut right, 1);

        let mut failing = |_: &mut u32, _: &AudioTimeStamp, _: u32, _: isize, _: &mut AudioBufferList| -50;
        let call = RenderCall::new(32, out.as_mut_ptr());
        assert_eq!(fx.render(&call, &mut failing), -50);

        assert!(left.iter().chain(right.iter()).all(|&s| s == 7.0));
        assert_eq!(fx.bridge.last_stage(), Some(RenderStage::AwaitInput));

        let mut out_null = BufferListStorage::<2>::new();
        let call = RenderCall::new(32, out_null.as_mut_ptr());
        assert_eq!(
            fx.render(&call, &mut NoInput),
            os_status::K_AUDIO_UNIT_ERR_NO_CONNECTION
        );
        assert!(out_null.buffers()[0].data.is_null());
    }

    #[test]
    fn test_zero_frames_skips_pull() {
        let mut fx = Fixture::new(stereo(), 512);
        let mut left = vec![3.0f32; 64];
        let mut right = vec![3.0f32; 64];
        let mut out = BufferListStorage::<2>::new();
        out.buffers_mut()[0].attach(&mut left, 1);
        out.buffers_mut()[1].attach(&mut right, 1);
        let mut pulled = false;
        let mut pull = |_: &mut u32, _: &AudioTimeStamp, _: u32, _: isize, _: &mut AudioBufferList| {
            pulled = true;
            0
        };
        let call = RenderCall::new(0, out.as_mut_ptr());
        assert_eq!(fx.render(&call, &mut pull), os_status::NO_ERR);
        assert!(!pulled);
        assert_eq!(fx.bridge.last_stage(), None);
        assert!(left.iter().chain(right.iter()).all(|&s| s == 3.0));
    }

    #[test]
    fn test_too_many_frames() {
        let mut fx = Fixture::new(stereo(), 256);
        let mut out = BufferListStorage::<2>::new();
        let call = RenderCall::new(257, out.as_mut_ptr());
        assert_eq!(
            fx.render(&call, &mut fill_with(|_| 0.0)),
            os_status::K_AUDIO_UNIT_ERR_TOO_MANY_FRAMES_TO_PROCESS
        );
    }

    #[test]
    fn test_null_output_uses_internal_storage() {
        let mut fx = Fixture::new(stereo(), 128);
        let mut out = BufferListStorage::<2>::new();
        let call = RenderCall::new(128, out.as_mut_ptr());
        assert_eq!(fx.render(&call, &mut fill_with(|n| n as f32)), os_status::NO_ERR);

        let buffer = out.buffers()[1];
        assert!(!buffer.data.is_null());
        assert_eq!(buffer.data_byte_size, 512);
        // SAFETY: the bridge attached 128 samples of its own storage.
        let right = unsafe { slice::from_raw_parts(buffer.data as *const f32, 128) };
        assert_eq!(right[10], 5.0);
    }

    #[test]
    fn test_interleaved_layout() {
        let mut fx = Fixture::new(StreamFormat::new(48_000.0, 2).interleaved(), 64);
        fx.tree.set_value(EffectParameter::DryWet.id(), 1.0).unwrap();

        let mut data = vec![0.0f32; 16];
        let mut out = BufferListStorage::<1>::new();
        out.buffers_mut()[0].attach(&mut data, 2);

        // Left frames are +n, right frames are -n.
        let mut pull = |_: &mut u32, _: &AudioTimeStamp, frames: u32, _: isize, list: &mut AudioBufferList| {
            assert_eq!(list.number_buffers, 1);
            // SAFETY: the bridge's list holds one interleaved buffer.
            let buffer = unsafe { list.buffer_at_mut(0) };
            assert_eq!(buffer.number_channels, 2);
            // SAFETY: attached for frames * 2 samples.
            let samples = unsafe {
                slice::from_raw_parts_mut(buffer.data as *mut f32, frames as usize * 2)
            };
            for (n, frame) in samples.chunks_exact_mut(2).enumerate() {
                frame[0] = n as f32;
                frame[1] = -(n as f32);
            }
            0
        };
        let call = RenderCall::new(8, out.as_mut_ptr());
        assert_eq!(fx.render(&call, &mut pull), os_status::NO_ERR);
        assert_eq!(
            data,
            [0.0, -0.0, 1.0, -1.0, 2.0, -2.0, 3.0, -3.0, 4.0, -4.0, 5.0, -5.0, 6.0, -6.0, 7.0, -7.0]
        );
    }

    #[test]
    fn test_mono_input_is_duplicated() {
        let mut fx = Fixture::new(StreamFormat::new(44_100.0, 1), 64);
        fx.tree.set_value(EffectParameter::DryWet.id(), 1.0).unwrap();

        // Host replaces the mono pull buffer with its own.
        let mut host_input = vec![0.25f32; 16];
        let host_ptr = host_input.as_mut_ptr();
        let mut pull = move |_: &mut u32, _: &AudioTimeStamp, _: u32, _: isize, list: &mut AudioBufferList| {
            // SAFETY: one buffer.
            let buffer = unsafe { list.buffer_at_mut(0) };
            buffer.data = host_ptr.cast();
            buffer.data_byte_size = 64;
            0
        };

        let mut left = vec![0.0f32; 16];
        let mut right = vec![0.0f32; 16];
        let mut out = BufferListStorage::<2>::new();
        out.buffers_mut()[0].attach(&mut left, 1);
        out.buffers_mut()[1].attach(&mut right, 1);

        let call = RenderCall::new(16, out.as_mut_ptr());
        assert_eq!(fx.render(&call, &mut pull), os_status::NO_ERR);
        assert_eq!(left, right);
        assert!(left.iter().all(|&s| s == 0.25));
        drop(host_input);
    }

    #[test]
    fn test_undersized_output_is_rejected() {
        let mut fx = Fixture::new(stereo(), 64);
        let mut left = vec![3.0f32; 64];
        let mut right = vec![3.0f32; 16];
        let mut out = BufferListStorage::<2>::new();
        out.buffers_mut()[0].attach(&mut left, 1);
        out.buffers_mut()[1].attach(&mut right, 1);

        let call = RenderCall::new(64, out.as_mut_ptr());
        assert_eq!(
            fx.render(&call, &mut fill_with(|_| 1.0)),
            os_status::K_AUDIO_UNIT_ERR_FORMAT_NOT_SUPPORTED
        );
        assert!(left.iter().all(|&s| s == 3.0));
        assert!(right.iter().all(|&s| s == 3.0));
    }

    #[test]
    fn test_rejected_output_list_is_not_rewritten() {
        let mut fx = Fixture::new(stereo(), 64);
        let mut right = vec![3.0f32; 16];
        let mut out = BufferListStorage::<2>::new();
        // Left is null and would be served from internal storage; right is too small.
        out.buffers_mut()[1].attach(&mut right, 1);

        let call = RenderCall::new(64, out.as_mut_ptr());
        assert_eq!(
            fx.render(&call, &mut fill_with(|_| 1.0)),
            os_status::K_AUDIO_UNIT_ERR_FORMAT_NOT_SUPPORTED
        );
        assert!(out.buffers()[0].data.is_null());
        assert_eq!(out.buffers()[0].data_byte_size, 0);
        assert!(right.iter().all(|&s| s == 3.0));
    }

    #[test]
    fn test_parameter_event_matches_core_audio_layout() {
        use std::mem::{offset_of, size_of};

        assert_eq!(offset_of!(AUParameterEvent, event_sample_time), 8);
        assert_eq!(offset_of!(AUParameterEvent, event_type), 16);
        assert_eq!(offset_of!(AUParameterEvent, ramp_duration_sample_frames), 20);
        assert_eq!(offset_of!(AUParameterEvent, parameter_address), 24);
        assert_eq!(offset_of!(AUParameterEvent, value), 32);
        assert_eq!(size_of::<AUParameterEvent>(), 40);
    }

    #[test]
    fn test_ramp_event_read_from_host_bytes() {
        // A ramp event as the host lays it out: duration 64 at offset 20,
        // address 1 at offset 24, target value 0.5 at offset 32.
        let mut bytes = [0u64; 5];
        // SAFETY: 40 bytes of u64 storage, viewed as bytes.
        let raw = unsafe { std::slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut u8, 40) };
        raw[16] = AURenderEventType::ParameterRamp as u8;
        raw[20..24].copy_from_slice(&64u32.to_ne_bytes());
        raw[24..32].copy_from_slice(&1u64.to_ne_bytes());
        raw[32..36].copy_from_slice(&0.5f32.to_ne_bytes());

        let tree = ParameterAutomationTree::new(ParameterCatalog::effect()).unwrap();
        // SAFETY: the buffer is 8-byte aligned, 40 bytes long and `next` is null.
        let applied =
            unsafe { apply_parameter_events(bytes.as_ptr() as *const AURenderEvent, &tree) };

        assert_eq!(applied, 1);
        assert_eq!(tree.get_value(EffectParameter::DelayFeedback.id()).unwrap(), 0.5);
        assert_eq!(tree.unknown_write_count(), 0);
    }

    #[test]
    fn test_automation_events_apply_before_process() {
        let mut fx = Fixture::new(stereo(), 64);

        let ramp = AURenderEvent {
            parameter: AUParameterEvent {
                next: ptr::null(),
                event_sample_time: 0,
                event_type: AURenderEventType::ParameterRamp as u8,
                reserved: [0; 3],
                ramp_duration_sample_frames: 64,
                parameter_address: EffectParameter::DryWet.id() as u64,
                value: 0.25,
            },
        };
        let unknown = AURenderEvent {
            parameter: AUParameterEvent {
                next: &ramp,
                event_sample_time: 0,
                event_type: AURenderEventType::Parameter as u8,
                reserved: [0; 3],
                ramp_duration_sample_frames: 0,
                parameter_address: 1 << 40,
                value: 1.0,
            },
        };
        let first = AURenderEvent {
            parameter: AUParameterEvent {
                next: &unknown,
                event_sample_time: 0,
                event_type: AURenderEventType::Parameter as u8,
                reserved: [0; 3],
                ramp_duration_sample_frames: 0,
                parameter_address: EffectParameter::DryWet.id() as u64,
                value: 1.0,
            },
        };

        let mut left = vec![0.0f32; 64];
        let mut right = vec![0.0f32; 64];
        let mut out = BufferListStorage::<2>::new();
        out.buffers_mut()[0].attach(&mut left, 1);
        out.buffers_mut()[1].attach(&mut right, 1);

        let call = RenderCall::new(64, out.as_mut_ptr()).with_events(&first);
        assert_eq!(fx.render(&call, &mut fill_with(|_| 1.0)), os_status::NO_ERR);

        // The ramp came last and jumps to its end value.
        assert!(left.iter().all(|&s| s == 0.25));
        assert_eq!(fx.tree.get_value(EffectParameter::DryWet.id()).unwrap(), 0.25);
        assert_eq!(fx.kernel.get_parameter(EffectParameter::DryWet.id()).unwrap(), 0.25);
        assert_eq!(fx.tree.unknown_write_count(), 1);
        assert!(fx.pending.is_empty());
    }

    #[test]
    fn test_ui_write_reaches_next_quantum() {
        let mut fx = Fixture::new(stereo(), 32);
        let mut left = vec![0.0f32; 32];
        let mut right = vec![0.0f32; 32];
        let mut out = BufferListStorage::<2>::new();
        out.buffers_mut()[0].attach(&mut left, 1);
        out.buffers_mut()[1].attach(&mut right, 1);
        let call = RenderCall::new(32, out.as_mut_ptr());

        fx.render(&call, &mut fill_with(|_| 1.0));
        assert_eq!(left[0], 0.5);

        fx.tree.set_value(EffectParameter::DryWet.id(), 0.0).unwrap();
        fx.render(&call, &mut fill_with(|_| 1.0));
        assert_eq!(left[0], 0.0);
    }
}
