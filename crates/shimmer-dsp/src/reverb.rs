//! Freeverb-style reverb for one channel.

/// Comb line lengths in samples at 44.1 kHz.
const COMB_TUNING: [usize; 8] = [1557, 1617, 1491, 1422, 1277, 1356, 1188, 1116];

/// Allpass line lengths in samples at 44.1 kHz.
const ALLPASS_TUNING: [usize; 4] = [225, 556, 441, 341];

const TUNING_RATE: f64 = 44_100.0;
const DAMPING: f32 = 0.5;
const ALLPASS_FEEDBACK: f32 = 0.5;

#[derive(Debug, Default)]
struct Line {
    buffer: Vec<f32>,
    pos: usize,
}

impl Line {
    fn resize(&mut self, len: usize) {
        self.buffer.clear();
        self.buffer.resize(len.max(1), 0.0);
        self.pos = 0;
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }

    #[inline]
    fn advance(&mut self) {
        self.pos += 1;
        if self.pos == self.buffer.len() {
            self.pos = 0;
        }
    }

    #[inline]
    fn comb(&mut self, input: f32, room_size: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        self.buffer[self.pos] = input + delayed * DAMPING * room_size;
        self.advance();
        delayed
    }

    #[inline]
    fn allpass(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        self.buffer[self.pos] = input + delayed * ALLPASS_FEEDBACK;
        self.advance();
        delayed - input * ALLPASS_FEEDBACK
    }
}

/// Parallel combs into series allpasses.
#[derive(Debug, Default)]
pub(crate) struct Reverb {
    combs: [Line; COMB_TUNING.len()],
    allpasses: [Line; ALLPASS_TUNING.len()],
}

impl Reverb {
    /// Size every line for `sample_rate`, adding `spread` samples to each.
    pub(crate) fn resize(&mut self, sample_rate: f64, spread: usize) {
        let scale = sample_rate / TUNING_RATE;
        for (line, &tuning) in self.combs.iter_mut().zip(COMB_TUNING.iter()) {
            line.resize((tuning as f64 * scale) as usize + spread);
        }
        for (line, &tuning) in self.allpasses.iter_mut().zip(ALLPASS_TUNING.iter()) {
            line.resize((tuning as f64 * scale) as usize + spread);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.combs.iter_mut().for_each(Line::clear);
        self.allpasses.iter_mut().for_each(Line::clear);
    }

    #[inline]
    pub(crate) fn process(&mut self, input: f32, room_size: f32) -> f32 {
        let sum: f32 = self
            .combs
            .iter_mut()
            .map(|line| line.comb(input, room_size))
            .sum();
        let mut out = sum / self.combs.len() as f32;

        for line in self.allpasses.iter_mut() {
            out = line.allpass(out);
        }
        out
    }
}
