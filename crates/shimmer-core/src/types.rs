//! Common types used throughout the Shimmer crates.

/// Parameter identifier (dense catalog address, `0..N-1`).
pub type ParameterId = u32;

/// Plain parameter value in the parameter's own units (ms, semitones, ratio).
pub type ParameterValue = f32;

/// Upper bound on catalog size.
///
/// Pending-change tracking uses one bit per parameter in an `AtomicU64`, so the
/// catalog can never grow past 64 entries.
pub const MAX_PARAMETERS: usize = 64;

/// Number of channels the effect renders (stereo in, stereo out).
pub const STEREO: usize = 2;
