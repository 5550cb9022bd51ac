//! OSStatus codes and the mapping from [`PluginError`].

use shimmer_core::PluginError;

/// OSStatus error codes returned across the C-ABI.
pub mod os_status {
    /// No error.
    pub const NO_ERR: i32 = 0;

    /// Invalid property value.
    pub const K_AUDIO_UNIT_ERR_INVALID_PROPERTY_VALUE: i32 = -10851;

    /// Property cannot be changed while render resources are allocated.
    pub const K_AUDIO_UNIT_ERR_INITIALIZED: i32 = -10849;

    /// Invalid parameter.
    pub const K_AUDIO_UNIT_ERR_INVALID_PARAMETER: i32 = -10878;

    /// Render resources have not been allocated.
    pub const K_AUDIO_UNIT_ERR_UNINITIALIZED: i32 = -10867;

    /// Cannot do in current context.
    pub const K_AUDIO_UNIT_ERR_CANNOT_DO_IN_CURRENT_CONTEXT: i32 = -10863;

    /// Invalid element (bus).
    pub const K_AUDIO_UNIT_ERR_INVALID_ELEMENT: i32 = -10877;

    /// No input connection.
    pub const K_AUDIO_UNIT_ERR_NO_CONNECTION: i32 = -10876;

    /// Allocating render resources failed.
    pub const K_AUDIO_UNIT_ERR_FAILED_INITIALIZATION: i32 = -10875;

    /// Too many frames to process.
    pub const K_AUDIO_UNIT_ERR_TOO_MANY_FRAMES_TO_PROCESS: i32 = -10874;

    /// Format not supported.
    pub const K_AUDIO_UNIT_ERR_FORMAT_NOT_SUPPORTED: i32 = -10868;
}

/// OSStatus reported to the host for an error.
///
/// A failed pull passes the host's own status back unchanged.
pub fn to_os_status(error: &PluginError) -> i32 {
    match error {
        PluginError::HostPullFailure(status) => *status,
        PluginError::UnknownParameter(_) => os_status::K_AUDIO_UNIT_ERR_INVALID_PARAMETER,
        PluginError::LifecycleViolation { state, .. } => match *state {
            "allocated" => os_status::K_AUDIO_UNIT_ERR_INITIALIZED,
            "unallocated" => os_status::K_AUDIO_UNIT_ERR_UNINITIALIZED,
            _ => os_status::K_AUDIO_UNIT_ERR_CANNOT_DO_IN_CURRENT_CONTEXT,
        },
        PluginError::ResourceAllocationFailure(_) => {
            os_status::K_AUDIO_UNIT_ERR_FAILED_INITIALIZATION
        }
        PluginError::UnsupportedFormat(_) => os_status::K_AUDIO_UNIT_ERR_FORMAT_NOT_SUPPORTED,
        PluginError::State(_) => os_status::K_AUDIO_UNIT_ERR_INVALID_PROPERTY_VALUE,
    }
}

/// Collapse a unit result into an OSStatus, logging failures.
pub(crate) fn status_of(operation: &str, result: shimmer_core::PluginResult<()>) -> i32 {
    match result {
        Ok(()) => os_status::NO_ERR,
        Err(e) => {
            log::error!("{} failed: {}", operation, e);
            to_os_status(&e)
        }
    }
}
