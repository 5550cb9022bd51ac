//! Core Audio buffer lists and the helpers the render bridge uses on them.
//!
//! `AudioBufferList` is a C struct with a flexible array member: the real buffer
//! count lives in `number_buffers` and reaching buffers past the first one needs
//! pointer arithmetic. [`AudioBufferList::buffer_at`] wraps that access.
//!
//! Lists the effect owns (the pull-input list and the test doubles for host
//! output) are [`BufferListStorage`], a `repr(C)` struct with a fixed array that
//! is layout-compatible with `AudioBufferList`, so no custom allocation is needed.
//!
//! # Safety
//!
//! Functions that take raw data pointers are `unsafe`; callers guarantee the
//! memory stays valid and unaliased for the duration of the render call.

use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

const SAMPLE_SIZE: usize = std::mem::size_of::<f32>();

/// Core Audio AudioBuffer structure.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AudioBuffer {
    /// Number of interleaved channels in the buffer. 1 for de-interleaved audio.
    pub number_channels: u32,
    /// Size of the buffer in bytes.
    pub data_byte_size: u32,
    /// Pointer to the audio data. May be null on output lists.
    pub data: *mut c_void,
}

impl AudioBuffer {
    /// A buffer with no data attached.
    pub const fn empty() -> Self {
        Self {
            number_channels: 1,
            data_byte_size: 0,
            data: ptr::null_mut(),
        }
    }

    /// Point this buffer at `samples`.
    pub fn attach(&mut self, samples: &mut [f32], number_channels: u32) {
        self.number_channels = number_channels;
        self.data_byte_size = byte_size(samples.len());
        self.data = samples.as_mut_ptr().cast();
    }
}

/// Core Audio AudioBufferList structure.
///
/// The array continues beyond `buffers` up to `number_buffers` entries.
#[repr(C)]
pub struct AudioBufferList {
    /// Number of buffers in the list.
    pub number_buffers: u32,
    /// First buffer. Use `buffer_at()` for the rest.
    pub buffers: [AudioBuffer; 1],
}

impl AudioBufferList {
    /// Get a reference to the buffer at the given index.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `index < number_buffers` and that the list
    /// really holds that many buffers.
    #[inline]
    pub unsafe fn buffer_at(&self, index: u32) -> &AudioBuffer {
        // SAFETY: caller guarantees index is within the flexible array.
        unsafe { &*self.buffers.as_ptr().add(index as usize) }
    }

    /// Get a mutable reference to the buffer at the given index.
    ///
    /// # Safety
    ///
    /// Same as [`AudioBufferList::buffer_at`].
    #[inline]
    pub unsafe fn buffer_at_mut(&mut self, index: u32) -> &mut AudioBuffer {
        // SAFETY: caller guarantees index is within the flexible array.
        unsafe { &mut *self.buffers.as_mut_ptr().add(index as usize) }
    }
}

/// Owned buffer list with room for `N` buffers.
///
/// Shares its prefix layout with [`AudioBufferList`], so it can be handed to
/// anything expecting one.
#[repr(C)]
pub struct BufferListStorage<const N: usize> {
    number_buffers: u32,
    buffers: [AudioBuffer; N],
}

impl<const N: usize> BufferListStorage<N> {
    const NON_EMPTY: () = assert!(N > 0, "a buffer list needs at least one buffer");

    /// A list of `N` empty buffers.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NON_EMPTY;
        Self {
            number_buffers: N as u32,
            buffers: [AudioBuffer::empty(); N],
        }
    }

    /// Capacity in buffers.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Set the advertised buffer count, clamped to the capacity.
    pub fn set_len(&mut self, count: usize) {
        self.number_buffers = count.min(N) as u32;
    }

    /// Buffers currently advertised.
    pub fn buffers(&self) -> &[AudioBuffer] {
        &self.buffers[..self.number_buffers as usize]
    }

    /// Mutable view of the advertised buffers.
    pub fn buffers_mut(&mut self) -> &mut [AudioBuffer] {
        &mut self.buffers[..self.number_buffers as usize]
    }

    /// View as a Core Audio buffer list.
    pub fn as_list(&self) -> &AudioBufferList {
        // SAFETY: repr(C) with the same leading fields and N >= 1, so the
        // AudioBufferList header plus its first buffer lie inside `self`.
        unsafe { &*(self as *const Self).cast::<AudioBufferList>() }
    }

    /// Mutable view as a Core Audio buffer list.
    pub fn as_list_mut(&mut self) -> &mut AudioBufferList {
        // SAFETY: see as_list.
        unsafe { &mut *(self as *mut Self).cast::<AudioBufferList>() }
    }

    /// Raw pointer for passing across the C-ABI.
    pub fn as_mut_ptr(&mut self) -> *mut AudioBufferList {
        (self as *mut Self).cast()
    }
}

impl<const N: usize> Default for BufferListStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte size of `samples` f32 values as Core Audio stores it.
#[inline]
pub fn byte_size(samples: usize) -> u32 {
    (samples * SAMPLE_SIZE) as u32
}

/// Whether a buffer can be read or written as `samples` f32 values.
///
/// Rejects null data, data not aligned for f32 and buffers shorter than
/// `samples * 4` bytes.
#[inline]
pub fn validate_f32_buffer(buffer: &AudioBuffer, samples: usize) -> bool {
    if buffer.data.is_null() {
        return false;
    }

    if (buffer.data as usize) % std::mem::align_of::<f32>() != 0 {
        warn_once(
            &MISALIGNED_WARNING_LOGGED,
            "Audio buffer not aligned for f32 access",
        );
        return false;
    }

    if (buffer.data_byte_size as usize) < samples * SAMPLE_SIZE {
        warn_once(
            &UNDERSIZED_WARNING_LOGGED,
            "Audio buffer smaller than the render quantum",
        );
        return false;
    }

    true
}

/// Whether two sample runs share memory.
#[inline]
pub fn runs_overlap(a: *const f32, b: *const f32, samples: usize) -> bool {
    let (a, b) = (a as usize, b as usize);
    let len = samples * SAMPLE_SIZE;
    a < b + len && b < a + len
}

/// Copy `samples` values from a host buffer into `dst`.
///
/// # Safety
///
/// `src` must be valid for reads of `dst.len()` f32 values. Overlap with `dst`
/// is allowed.
#[inline]
pub unsafe fn copy_in(src: *const f32, dst: &mut [f32]) {
    if ptr::eq(src, dst.as_ptr()) {
        return;
    }
    // SAFETY: caller guarantees `src` is readable for dst.len() samples;
    // ptr::copy tolerates overlap.
    unsafe { ptr::copy(src, dst.as_mut_ptr(), dst.len()) };
}

/// Split interleaved stereo into two runs.
#[inline]
pub fn deinterleave(interleaved: &[f32], left: &mut [f32], right: &mut [f32]) {
    for ((frame, l), r) in interleaved
        .chunks_exact(2)
        .zip(left.iter_mut())
        .zip(right.iter_mut())
    {
        *l = frame[0];
        *r = frame[1];
    }
}

/// Merge two runs into interleaved stereo.
#[inline]
pub fn interleave(left: &[f32], right: &[f32], interleaved: &mut [f32]) {
    for ((frame, l), r) in interleaved
        .chunks_exact_mut(2)
        .zip(left.iter())
        .zip(right.iter())
    {
        frame[0] = *l;
        frame[1] = *r;
    }
}

static MISALIGNED_WARNING_LOGGED: AtomicBool = AtomicBool::new(false);
static UNDERSIZED_WARNING_LOGGED: AtomicBool = AtomicBool::new(false);
static LAYOUT_WARNING_LOGGED: AtomicBool = AtomicBool::new(false);

/// Log a warning the first time `flag` is seen unset.
pub(crate) fn warn_once(flag: &AtomicBool, message: &str) {
    if !flag.swap(true, Ordering::Relaxed) {
        log::warn!("{} (further occurrences suppressed)", message);
    }
}

/// One-time warning for buffer layouts the bridge cannot map.
pub(crate) fn warn_unsupported_layout() {
    warn_once(
        &LAYOUT_WARNING_LOGGED,
        "Unsupported buffer layout: expected 1 or 2 f32 buffers of 1 or 2 channels",
    );
}
