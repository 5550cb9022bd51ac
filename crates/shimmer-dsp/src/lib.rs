//! # shimmer-dsp
//!
//! Reference signal-processing core for the Shimmer effect.
//!
//! [`ShimmerCore`] implements [`DspCore`] with:
//! - a stereo feedback delay line (up to 2 seconds)
//! - a shimmer tap that reads the delay line slightly behind the main tap
//! - a Freeverb-style reverb (8 parallel combs, 4 series allpasses per side)
//!
//! The wet signal is `delay * delayMix + reverb * reverbMix`, and the output is
//! the dry/wet crossfade of input and wet. All buffers are sized in
//! [`DspCore::initialize`]; `process` never allocates.

mod reverb;

use shimmer_core::{DspCore, EffectParameter, ParameterCatalog, ParameterId, ParameterValue, PluginResult};

use crate::reverb::Reverb;

/// Longest delay the line can hold, in seconds.
const MAX_DELAY_SECONDS: f64 = 2.0;

/// Offset of the shimmer tap behind the main tap, in seconds.
const SHIMMER_OFFSET_SECONDS: f64 = 0.01;

/// Below this amount the shimmer tap is skipped.
const SHIMMER_THRESHOLD: f32 = 0.01;

/// Extra samples added to every right-channel reverb line for stereo width.
const STEREO_SPREAD: usize = 23;

/// Stereo feedback delay line.
#[derive(Debug, Default)]
struct DelayLine {
    left: Vec<f32>,
    right: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    fn resize(&mut self, len: usize) {
        let len = len.max(1);
        self.left.clear();
        self.left.resize(len, 0.0);
        self.right.clear();
        self.right.resize(len, 0.0);
        self.write_pos = 0;
    }

    fn clear(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
        self.write_pos = 0;
    }

    #[inline]
    fn len(&self) -> usize {
        self.left.len()
    }

    /// Position `offset` samples behind the write head.
    #[inline]
    fn behind(&self, pos: usize, offset: usize) -> usize {
        let len = self.len();
        (pos + len - offset % len) % len
    }
}

/// The reference delay/reverb/shimmer core.
#[derive(Debug)]
pub struct ShimmerCore {
    values: [ParameterValue; EffectParameter::COUNT],
    sample_rate: f64,
    channel_count: u32,
    delay: DelayLine,
    reverb_left: Reverb,
    reverb_right: Reverb,
}

impl ShimmerCore {
    /// Create a core with catalog defaults, prepared for stereo at 44.1 kHz.
    pub fn new() -> Self {
        let mut values = [0.0; EffectParameter::COUNT];
        for descriptor in ParameterCatalog::effect().iter() {
            values[descriptor.id as usize] = descriptor.default;
        }

        let mut core = Self {
            values,
            sample_rate: 0.0,
            channel_count: 0,
            delay: DelayLine::default(),
            reverb_left: Reverb::default(),
            reverb_right: Reverb::default(),
        };
        core.prepare(2, 44_100.0);
        core
    }

    /// Boxed constructor matching the kernel factory signature.
    pub fn boxed() -> PluginResult<Box<dyn DspCore>> {
        Ok(Box::new(Self::new()))
    }

    /// Sample rate the buffers are sized for.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    fn value(&self, parameter: EffectParameter) -> f32 {
        self.values[parameter.id() as usize]
    }

    fn prepare(&mut self, channel_count: u32, sample_rate: f64) {
        self.channel_count = channel_count;
        self.sample_rate = sample_rate;
        self.delay.resize((MAX_DELAY_SECONDS * sample_rate) as usize);
        self.reverb_left.resize(sample_rate, 0);
        self.reverb_right.resize(sample_rate, STEREO_SPREAD);
    }
}

impl Default for ShimmerCore {
    fn default() -> Self {
        Self::new()
    }
}

impl DspCore for ShimmerCore {
    fn initialize(&mut self, channel_count: u32, sample_rate: f64) -> PluginResult<()> {
        self.prepare(channel_count, sample_rate);
        log::debug!(
            "ShimmerCore prepared: {} channel(s), {} Hz, {} delay samples",
            channel_count,
            sample_rate,
            self.delay.len()
        );
        Ok(())
    }

    fn reset(&mut self) {
        self.delay.clear();
        self.reverb_left.clear();
        self.reverb_right.clear();
    }

    fn set_parameter(&mut self, id: ParameterId, value: ParameterValue) {
        if let Some(slot) = self.values.get_mut(id as usize) {
            *slot = value;
        }
    }

    fn get_parameter(&self, id: ParameterId) -> ParameterValue {
        self.values.get(id as usize).copied().unwrap_or(0.0)
    }

    fn process(
        &mut self,
        input_left: &[f32],
        input_right: &[f32],
        output_left: &mut [f32],
        output_right: &mut [f32],
    ) {
        let delay_time = self.value(EffectParameter::DelayTime);
        let feedback = self.value(EffectParameter::DelayFeedback);
        let delay_mix = self.value(EffectParameter::DelayMix);
        let room_size = 0.28 + self.value(EffectParameter::ReverbSize) * 0.7;
        let reverb_mix = self.value(EffectParameter::ReverbMix);
        let shimmer = self.value(EffectParameter::ShimmerAmount);
        let dry_wet = self.value(EffectParameter::DryWet);

        let len = self.delay.len();
        let delay_samples =
            ((delay_time as f64 / 1000.0 * self.sample_rate) as usize).min(len - 1);
        let shimmer_offset = (self.sample_rate * SHIMMER_OFFSET_SECONDS) as usize;

        let frames = output_left
            .len()
            .min(output_right.len())
            .min(input_left.len())
            .min(input_right.len());

        for i in 0..frames {
            let in_l = input_left[i];
            let in_r = input_right[i];

            let write = self.delay.write_pos;
            let read = self.delay.behind(write, delay_samples);
            let delayed_l = self.delay.left[read];
            let delayed_r = self.delay.right[read];

            let (shimmer_l, shimmer_r) = if shimmer > SHIMMER_THRESHOLD {
                let tap = self.delay.behind(read, shimmer_offset);
                (self.delay.left[tap] * shimmer, self.delay.right[tap] * shimmer)
            } else {
                (0.0, 0.0)
            };

            let delay_l = delayed_l + shimmer_l;
            let delay_r = delayed_r + shimmer_r;

            let reverb_l = self.reverb_left.process(delay_l, room_size);
            let reverb_r = self.reverb_right.process(delay_r, room_size);

            let wet_l = delay_l * delay_mix + reverb_l * reverb_mix;
            let wet_r = delay_r * delay_mix + reverb_r * reverb_mix;

            self.delay.left[write] = in_l + delayed_l * feedback;
            self.delay.right[write] = in_r + delayed_r * feedback;
            self.delay.write_pos = (write + 1) % len;

            output_left[i] = in_l * (1.0 - dry_wet) + wet_l * dry_wet;
            output_right[i] = in_r * (1.0 - dry_wet) + wet_r * dry_wet;
        }
    }
}
