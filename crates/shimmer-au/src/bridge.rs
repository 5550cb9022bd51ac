//! C-ABI surface for the Objective-C AU wrapper.
//!
//! ```text
//! AU Host
//!    ↓
//! Objective-C wrapper (AUAudioUnit subclass)
//!    ↓ C-ABI calls
//! bridge.rs (this module)
//!    ↓
//! EffectInstance / RenderBridge
//!    ↓
//! KernelHandle → DSP core
//! ```
//!
//! # Threading
//!
//! Each handle keeps the [`EffectInstance`] behind a `Mutex`. Setup calls lock
//! it; the render call only `try_lock`s and reports
//! `kAudioUnitErr_CannotDoInCurrentContext` on contention. Parameter get/set goes
//! straight to a separately shared `Arc<ParameterAutomationTree>`, so UI and
//! automation never touch the instance lock.
//!
//! # Safety
//!
//! Every function checks its pointers for null and wraps its body in
//! `catch_unwind` so no panic crosses the FFI boundary.

// These are C-ABI entry points called from Objective-C. The ObjC side is responsible
// for passing valid pointers.
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::ffi::{c_char, c_void, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use shimmer_core::{NotificationPump, ObserverToken, ParameterAutomationTree};

use crate::buffers::AudioBufferList;
use crate::error::{os_status, status_of};
use crate::factory;
use crate::lifecycle::{EffectInstance, StreamFormat};
use crate::render::{AURenderEvent, AudioTimeStamp, BlockPullInput, NoInput, RenderCall};

// =============================================================================
// Macros
// =============================================================================

/// Run `$body` with `$handle: &ShimmerInstanceHandle`, returning `$default` for
/// a null handle or a panic.
macro_rules! with_instance {
    ($instance:expr, $default:expr, |$handle:ident| $body:expr) => {{
        if $instance.is_null() {
            return $default;
        }
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
            let $handle = &*$instance;
            $body
        }))
        .unwrap_or($default)
    }};
}

/// Variant of `with_instance!` for functions that return `()`.
macro_rules! with_instance_void {
    ($instance:expr, |$handle:ident| $body:expr) => {{
        if $instance.is_null() {
            return;
        }
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
            let $handle = &*$instance;
            $body
        }));
    }};
}

// =============================================================================
// C-ABI Types
// =============================================================================

/// Maximum length of parameter strings, including the terminator.
const SHIMMER_AU_MAX_PARAM_NAME_LENGTH: usize = 128;

/// Parameter metadata for building the AUParameterTree.
#[repr(C)]
pub struct ShimmerAuParameterInfo {
    /// Parameter id, used as the AU parameter address.
    pub id: u32,
    /// Stable identifier (e.g. "delayTime"), null-terminated.
    pub identifier: [c_char; SHIMMER_AU_MAX_PARAM_NAME_LENGTH],
    /// Display name, null-terminated.
    pub name: [c_char; SHIMMER_AU_MAX_PARAM_NAME_LENGTH],
    /// Unit suffix ("ms", "st" or empty), null-terminated.
    pub units: [c_char; SHIMMER_AU_MAX_PARAM_NAME_LENGTH],
    /// AudioUnitParameterUnit value.
    pub unit_type: u32,
    pub min_value: f32,
    pub max_value: f32,
    pub default_value: f32,
    pub current_value: f32,
}

impl Default for ShimmerAuParameterInfo {
    fn default() -> Self {
        Self {
            id: 0,
            identifier: [0; SHIMMER_AU_MAX_PARAM_NAME_LENGTH],
            name: [0; SHIMMER_AU_MAX_PARAM_NAME_LENGTH],
            units: [0; SHIMMER_AU_MAX_PARAM_NAME_LENGTH],
            unit_type: 0,
            min_value: 0.0,
            max_value: 0.0,
            default_value: 0.0,
            current_value: 0.0,
        }
    }
}

/// Change callback registered from the wrapper: `(context, id, value)`.
pub type ShimmerAuParameterObserver = extern "C" fn(context: *mut c_void, id: u32, value: f32);

/// Opaque context pointer owned by the wrapper.
struct ObserverContext(*mut c_void);

impl ObserverContext {
    fn as_ptr(&self) -> *mut c_void {
        self.0
    }
}

// SAFETY: the wrapper guarantees the context stays valid and may be used from the
// notification thread until the observer is removed.
unsafe impl Send for ObserverContext {}

/// Per-instance state behind the opaque handle.
pub struct ShimmerInstanceHandle {
    instance: Mutex<EffectInstance>,
    /// Same tree as the instance's, reachable without the instance lock.
    tree: Arc<ParameterAutomationTree>,
    pump: Mutex<Option<NotificationPump>>,
}

/// Type alias for the opaque handle pointer.
pub type ShimmerAuInstanceHandle = *mut ShimmerInstanceHandle;

// =============================================================================
// Helper Functions
// =============================================================================

fn lock_instance(handle: &ShimmerInstanceHandle) -> Result<MutexGuard<'_, EffectInstance>, i32> {
    handle
        .instance
        .lock()
        .map_err(|_| os_status::K_AUDIO_UNIT_ERR_CANNOT_DO_IN_CURRENT_CONTEXT)
}

/// Copy a Rust string into a fixed-size C char array.
fn copy_str_to_char_array(s: &str, dest: &mut [c_char]) {
    let bytes = s.as_bytes();
    let copy_len = bytes.len().min(dest.len() - 1);
    for (d, &b) in dest.iter_mut().zip(&bytes[..copy_len]) {
        *d = b as c_char;
    }
    dest[copy_len] = 0;
}

/// Copy a Rust string into a caller buffer. Returns the bytes written, excluding
/// the terminator.
///
/// # Safety
/// `out_buffer` must be writable for `buffer_len > 0` bytes.
unsafe fn copy_str_to_buffer(s: &str, out_buffer: *mut c_char, buffer_len: u32) -> u32 {
    let bytes = s.as_bytes();
    let copy_len = bytes.len().min(buffer_len as usize - 1);
    // SAFETY: caller guarantees buffer_len writable bytes; copy_len < buffer_len.
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), out_buffer as *mut u8, copy_len);
        *out_buffer.add(copy_len) = 0;
    }
    copy_len as u32
}

// =============================================================================
// Factory Registration
// =============================================================================

/// Whether a plugin factory has been registered.
#[no_mangle]
pub extern "C" fn shimmer_au_ensure_factory_registered() -> bool {
    factory::is_registered()
}

/// Fill in the AudioComponentDescription from the registered config.
///
/// # Safety
///
/// `desc` must point at five writable `u32`s (type, subtype, manufacturer,
/// flags, mask).
#[no_mangle]
pub unsafe extern "C" fn shimmer_au_get_component_description(desc: *mut u32) {
    if desc.is_null() {
        return;
    }
    if let Some(config) = factory::plugin_config() {
        // SAFETY: caller guarantees five writable u32s.
        unsafe {
            *desc.add(0) = config.component_type_u32();
            *desc.add(1) = config.subtype_u32();
            *desc.add(2) = config.manufacturer_u32();
            *desc.add(3) = 0; // componentFlags
            *desc.add(4) = 0; // componentFlagsMask
        }
    }
}

/// Copy the plugin name into `out_buffer`. Returns the length written.
#[no_mangle]
pub extern "C" fn shimmer_au_get_name(out_buffer: *mut c_char, buffer_len: u32) -> u32 {
    if out_buffer.is_null() || buffer_len == 0 {
        return 0;
    }
    catch_unwind(AssertUnwindSafe(|| match factory::plugin_config() {
        // SAFETY: validated non-null with a positive length above.
        Some(config) => unsafe { copy_str_to_buffer(config.name, out_buffer, buffer_len) },
        None => 0,
    }))
    .unwrap_or(0)
}

/// Copy the vendor name into `out_buffer`. Returns the length written.
#[no_mangle]
pub extern "C" fn shimmer_au_get_vendor(out_buffer: *mut c_char, buffer_len: u32) -> u32 {
    if out_buffer.is_null() || buffer_len == 0 {
        return 0;
    }
    catch_unwind(AssertUnwindSafe(|| match factory::plugin_config() {
        // SAFETY: validated non-null with a positive length above.
        Some(config) => unsafe { copy_str_to_buffer(config.vendor, out_buffer, buffer_len) },
        None => 0,
    }))
    .unwrap_or(0)
}

/// Packed AU component version (0xMMMMmmbb), or 0 if nothing is registered.
#[no_mangle]
pub extern "C" fn shimmer_au_get_version() -> u32 {
    catch_unwind(|| factory::plugin_config().map_or(0, |config| config.au_version()))
        .unwrap_or(0)
}

/// Copy the comma-separated AU tags (e.g. "Delay,Reverb") into `out_buffer`.
/// Returns the length written.
#[no_mangle]
pub extern "C" fn shimmer_au_get_tags(out_buffer: *mut c_char, buffer_len: u32) -> u32 {
    if out_buffer.is_null() || buffer_len == 0 {
        return 0;
    }
    catch_unwind(AssertUnwindSafe(|| match factory::plugin_config() {
        // SAFETY: validated non-null with a positive length above.
        Some(config) => unsafe { copy_str_to_buffer(&config.au_tags(), out_buffer, buffer_len) },
        None => 0,
    }))
    .unwrap_or(0)
}

// =============================================================================
// Instance Lifecycle
// =============================================================================

/// Create a new instance from the registered factory.
///
/// Returns null if no factory is registered or the DSP core cannot be built.
/// The handle must be released with `shimmer_au_destroy_instance`.
#[no_mangle]
pub extern "C" fn shimmer_au_create_instance() -> ShimmerAuInstanceHandle {
    let result = catch_unwind(|| {
        let instance = match factory::create_instance()? {
            Ok(instance) => instance,
            Err(e) => {
                log::error!("Failed to create instance: {}", e);
                return None;
            }
        };
        let tree = Arc::clone(instance.tree());

        Some(Box::into_raw(Box::new(ShimmerInstanceHandle {
            instance: Mutex::new(instance),
            tree,
            pump: Mutex::new(None),
        })))
    });

    match result {
        Ok(Some(ptr)) => ptr,
        Ok(None) | Err(_) => ptr::null_mut(),
    }
}

/// Destroy an instance and free its handle.
///
/// # Safety
///
/// - `instance` must come from `shimmer_au_create_instance`, or be null
/// - It must not be used again afterwards, nor concurrently with this call
#[no_mangle]
pub extern "C" fn shimmer_au_destroy_instance(instance: ShimmerAuInstanceHandle) {
    if instance.is_null() {
        return;
    }

    let _ = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: caller hands over ownership of a live handle.
        let handle = unsafe { Box::from_raw(instance) };

        if let Ok(mut pump) = handle.pump.lock() {
            if let Some(mut pump) = pump.take() {
                pump.stop();
            }
        }
        match handle.instance.lock() {
            Ok(mut instance) => {
                if let Err(e) = instance.destroy() {
                    log::error!("Destroy failed: {}", e);
                }
            }
            Err(_) => log::error!("Instance lock poisoned, dropping without destroy"),
        };
    }));
}

/// Set the output bus format. Only valid while render resources are unallocated.
#[no_mangle]
pub extern "C" fn shimmer_au_set_output_format(
    instance: ShimmerAuInstanceHandle,
    sample_rate: f64,
    channel_count: u32,
    interleaved: bool,
) -> i32 {
    with_instance!(instance, os_status::K_AUDIO_UNIT_ERR_INVALID_PARAMETER, |handle| {
        let mut fx = match lock_instance(handle) {
            Ok(guard) => guard,
            Err(status) => return status,
        };
        let mut format = StreamFormat::new(sample_rate, channel_count);
        if interleaved {
            format = format.interleaved();
        }
        status_of("set_output_format", fx.set_output_format(format))
    })
}

/// Set the largest quantum the host will render. Only valid while unallocated.
#[no_mangle]
pub extern "C" fn shimmer_au_set_maximum_frames_to_render(
    instance: ShimmerAuInstanceHandle,
    max_frames: u32,
) -> i32 {
    with_instance!(instance, os_status::K_AUDIO_UNIT_ERR_INVALID_PARAMETER, |handle| {
        let mut fx = match lock_instance(handle) {
            Ok(guard) => guard,
            Err(status) => return status,
        };
        status_of(
            "set_maximum_frames_to_render",
            fx.set_maximum_frames_to_render(max_frames),
        )
    })
}

/// Current maximum frames per render call.
#[no_mangle]
pub extern "C" fn shimmer_au_get_maximum_frames_to_render(instance: ShimmerAuInstanceHandle) -> u32 {
    with_instance!(instance, 0, |handle| {
        match lock_instance(handle) {
            Ok(fx) => fx.maximum_frames_to_render(),
            Err(_) => 0,
        }
    })
}

/// Allocate render resources for the negotiated format.
#[no_mangle]
pub extern "C" fn shimmer_au_allocate_render_resources(instance: ShimmerAuInstanceHandle) -> i32 {
    with_instance!(instance, os_status::K_AUDIO_UNIT_ERR_INVALID_PARAMETER, |handle| {
        let mut fx = match lock_instance(handle) {
            Ok(guard) => guard,
            Err(status) => return status,
        };
        status_of("allocate_render_resources", fx.allocate_render_resources())
    })
}

/// Release render resources. The host stops rendering first.
#[no_mangle]
pub extern "C" fn shimmer_au_deallocate_render_resources(instance: ShimmerAuInstanceHandle) -> i32 {
    with_instance!(instance, os_status::K_AUDIO_UNIT_ERR_INVALID_PARAMETER, |handle| {
        let mut fx = match lock_instance(handle) {
            Ok(guard) => guard,
            Err(status) => return status,
        };
        status_of("deallocate_render_resources", fx.deallocate_render_resources())
    })
}

/// Whether render resources are allocated.
#[no_mangle]
pub extern "C" fn shimmer_au_is_allocated(instance: ShimmerAuInstanceHandle) -> bool {
    with_instance!(instance, false, |handle| {
        match lock_instance(handle) {
            Ok(fx) => fx.is_allocated(),
            Err(_) => false,
        }
    })
}

/// Clear DSP state (delay and reverb tails).
#[no_mangle]
pub extern "C" fn shimmer_au_reset(instance: ShimmerAuInstanceHandle) {
    with_instance_void!(instance, |handle| {
        if let Ok(mut fx) = lock_instance(handle) {
            if let Err(e) = fx.reset() {
                log::error!("Reset failed: {}", e);
            }
        }
    })
}

// =============================================================================
// Audio Rendering
// =============================================================================

/// Render one quantum. Called on the host's real-time thread.
///
/// # Safety
///
/// - `instance` must be a live handle
/// - `output_data` must be a valid `AudioBufferList` whose non-null buffers
///   cover `frame_count` frames
/// - `action_flags`, `timestamp` and `events` may be null
/// - `pull_input_block` must be null or the host's `AURenderPullInputBlock`
#[no_mangle]
pub extern "C" fn shimmer_au_render(
    instance: ShimmerAuInstanceHandle,
    action_flags: *mut u32,
    timestamp: *const AudioTimeStamp,
    frame_count: u32,
    output_bus_number: isize,
    output_data: *mut AudioBufferList,
    events: *const AURenderEvent,
    pull_input_block: *const c_void,
) -> i32 {
    if instance.is_null() || output_data.is_null() {
        return os_status::K_AUDIO_UNIT_ERR_INVALID_PARAMETER;
    }

    let result = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: validated non-null; the wrapper keeps the handle alive while rendering.
        let handle = unsafe { &*instance };

        // Never block the audio thread on setup calls.
        let mut fx = match handle.instance.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) | Err(TryLockError::Poisoned(_)) => {
                return os_status::K_AUDIO_UNIT_ERR_CANNOT_DO_IN_CURRENT_CONTEXT;
            }
        };

        let call = RenderCall {
            action_flags,
            timestamp,
            frame_count,
            output_bus: output_bus_number,
            output: output_data,
            events,
        };

        // SAFETY: pointer validity is the host's render contract, and the block is
        // only used within this call.
        unsafe {
            match BlockPullInput::new(pull_input_block) {
                Some(mut pull) => fx.render(&call, &mut pull),
                None => fx.render(&call, &mut NoInput),
            }
        }
    }));

    result.unwrap_or(os_status::K_AUDIO_UNIT_ERR_CANNOT_DO_IN_CURRENT_CONTEXT)
}

// =============================================================================
// Parameters
// =============================================================================

/// Number of parameters.
#[no_mangle]
pub extern "C" fn shimmer_au_get_parameter_count(instance: ShimmerAuInstanceHandle) -> u32 {
    with_instance!(instance, 0, |handle| handle.tree.len() as u32)
}

/// Describe the parameter at `index`. Returns `false` if out of range.
#[no_mangle]
pub extern "C" fn shimmer_au_get_parameter_info(
    instance: ShimmerAuInstanceHandle,
    index: u32,
    out_info: *mut ShimmerAuParameterInfo,
) -> bool {
    if out_info.is_null() {
        return false;
    }

    with_instance!(instance, false, |handle| {
        let Some(descriptor) = handle.tree.catalog().iter().nth(index as usize) else {
            return false;
        };

        // SAFETY: out_info was validated as non-null above
        let out = &mut *out_info;
        out.id = descriptor.id;
        copy_str_to_char_array(descriptor.identifier, &mut out.identifier);
        copy_str_to_char_array(descriptor.name, &mut out.name);
        copy_str_to_char_array(descriptor.unit.formatter().unit(), &mut out.units);
        out.unit_type = descriptor.unit.as_au_unit();
        out.min_value = descriptor.min;
        out.max_value = descriptor.max;
        out.default_value = descriptor.default;
        out.current_value = handle.tree.get_value(descriptor.id).unwrap_or(descriptor.default);
        true
    })
}

/// Current plain value. Unknown ids read as 0.
#[no_mangle]
pub extern "C" fn shimmer_au_get_parameter_value(instance: ShimmerAuInstanceHandle, id: u32) -> f32 {
    with_instance!(instance, 0.0, |handle| handle.tree.get_value(id).unwrap_or(0.0))
}

/// Write a plain value. Returns the stored (clamped) value, or NaN for unknown ids.
#[no_mangle]
pub extern "C" fn shimmer_au_set_parameter_value(
    instance: ShimmerAuInstanceHandle,
    id: u32,
    value: f32,
) -> f32 {
    with_instance!(instance, f32::NAN, |handle| {
        handle.tree.set_value(id, value).unwrap_or(f32::NAN)
    })
}

/// Format `value` for display. Returns the length written.
#[no_mangle]
pub extern "C" fn shimmer_au_format_parameter_value(
    instance: ShimmerAuInstanceHandle,
    id: u32,
    value: f32,
    out_buffer: *mut c_char,
    buffer_len: u32,
) -> u32 {
    if out_buffer.is_null() || buffer_len == 0 {
        return 0;
    }

    with_instance!(instance, 0, |handle| {
        match handle.tree.catalog().describe(id) {
            Ok(descriptor) => copy_str_to_buffer(&descriptor.display(value), out_buffer, buffer_len),
            Err(_) => 0,
        }
    })
}

/// Parse display text into a clamped plain value.
#[no_mangle]
pub extern "C" fn shimmer_au_parse_parameter_value(
    instance: ShimmerAuInstanceHandle,
    id: u32,
    string: *const c_char,
    out_value: *mut f32,
) -> bool {
    if string.is_null() || out_value.is_null() {
        return false;
    }

    with_instance!(instance, false, |handle| {
        // SAFETY: string was validated as non-null above
        let Ok(text) = CStr::from_ptr(string).to_str() else {
            return false;
        };
        let Ok(descriptor) = handle.tree.catalog().describe(id) else {
            return false;
        };
        match descriptor.parse(text) {
            Some(value) => {
                // SAFETY: out_value was validated as non-null above
                *out_value = value;
                true
            }
            None => false,
        }
    })
}

// =============================================================================
// Notifications
// =============================================================================

/// Register a change observer. Returns a token, or 0 on failure.
///
/// The callback runs from `shimmer_au_dispatch_parameter_notifications` or the
/// notification pump thread, never from render.
#[no_mangle]
pub extern "C" fn shimmer_au_add_parameter_observer(
    instance: ShimmerAuInstanceHandle,
    callback: Option<ShimmerAuParameterObserver>,
    context: *mut c_void,
) -> u64 {
    let Some(callback) = callback else {
        return 0;
    };
    with_instance!(instance, 0, |handle| {
        let context = ObserverContext(context);
        handle
            .tree
            .observe_changes(move |id, value| callback(context.as_ptr(), id, value))
            .as_raw()
    })
}

/// Remove an observer. Returns `false` for unknown tokens.
#[no_mangle]
pub extern "C" fn shimmer_au_remove_parameter_observer(
    instance: ShimmerAuInstanceHandle,
    token: u64,
) -> bool {
    with_instance!(instance, false, |handle| {
        handle.tree.remove_observer(ObserverToken::from_raw(token))
    })
}

/// Deliver pending changes to observers on the calling thread. Returns the
/// number of parameters delivered.
#[no_mangle]
pub extern "C" fn shimmer_au_dispatch_parameter_notifications(
    instance: ShimmerAuInstanceHandle,
) -> u32 {
    with_instance!(instance, 0, |handle| handle.tree.dispatch_notifications() as u32)
}

/// Start a background thread dispatching notifications every `interval_ms`
/// (0 for the default). Returns `false` if already running or the thread could
/// not be spawned.
#[no_mangle]
pub extern "C" fn shimmer_au_start_notification_pump(
    instance: ShimmerAuInstanceHandle,
    interval_ms: u32,
) -> bool {
    with_instance!(instance, false, |handle| {
        let Ok(mut slot) = handle.pump.lock() else {
            return false;
        };
        if slot.is_some() {
            return false;
        }
        let tree = Arc::clone(&handle.tree);
        let started = if interval_ms == 0 {
            NotificationPump::start(tree)
        } else {
            NotificationPump::with_interval(tree, Duration::from_millis(interval_ms as u64))
        };
        match started {
            Ok(pump) => {
                *slot = Some(pump);
                true
            }
            Err(e) => {
                log::error!("Failed to start notification pump: {}", e);
                false
            }
        }
    })
}

/// Stop the notification thread, if running.
#[no_mangle]
pub extern "C" fn shimmer_au_stop_notification_pump(instance: ShimmerAuInstanceHandle) {
    with_instance_void!(instance, |handle| {
        if let Ok(mut slot) = handle.pump.lock() {
            if let Some(mut pump) = slot.take() {
                pump.stop();
            }
        }
    })
}

// =============================================================================
// State
// =============================================================================

/// Size in bytes of the serialized state.
#[no_mangle]
pub extern "C" fn shimmer_au_get_state_size(instance: ShimmerAuInstanceHandle) -> u32 {
    with_instance!(instance, 0, |handle| {
        handle
            .tree
            .snapshot()
            .to_bytes()
            .map(|bytes| bytes.len() as u32)
            .unwrap_or(0)
    })
}

/// Serialize the state into `buffer`. Returns the bytes written.
#[no_mangle]
pub extern "C" fn shimmer_au_get_state(
    instance: ShimmerAuInstanceHandle,
    buffer: *mut u8,
    size: u32,
) -> u32 {
    if buffer.is_null() {
        return 0;
    }

    with_instance!(instance, 0, |handle| {
        let state = match handle.tree.snapshot().to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("Failed to save state: {}", e);
                return 0;
            }
        };
        let copy_len = state.len().min(size as usize);
        if copy_len > 0 {
            // SAFETY: buffer was validated as non-null above, and copy_len <= size
            ptr::copy_nonoverlapping(state.as_ptr(), buffer, copy_len);
        }
        copy_len as u32
    })
}

/// Restore state from `buffer`.
#[no_mangle]
pub extern "C" fn shimmer_au_set_state(
    instance: ShimmerAuInstanceHandle,
    buffer: *const u8,
    size: u32,
) -> i32 {
    if buffer.is_null() {
        return os_status::K_AUDIO_UNIT_ERR_INVALID_PARAMETER;
    }

    with_instance!(instance, os_status::K_AUDIO_UNIT_ERR_INVALID_PARAMETER, |handle| {
        // SAFETY: buffer is non-null and readable for `size` bytes
        let data = std::slice::from_raw_parts(buffer, size as usize);
        let mut fx = match lock_instance(handle) {
            Ok(guard) => guard,
            Err(status) => return status,
        };
        status_of("set_state", fx.set_full_state(data).map(|_| ()))
    })
}
