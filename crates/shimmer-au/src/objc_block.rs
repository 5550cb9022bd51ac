//! Calling Objective-C blocks handed over by the AU host.
//!
//! A block is an object whose header holds an `invoke` function pointer. The
//! object pointer itself is not callable; the invoke pointer is, with the block
//! pointer as its first argument.

use std::ffi::c_void;

/// Minimal Objective-C block header layout.
#[repr(C)]
pub(crate) struct ObjCBlockLiteral {
    _isa: *const c_void,
    _flags: u32,
    _reserved: u32,
    invoke: *const c_void,
    _descriptor: *const c_void,
}

/// Extract the block's invoke function pointer.
///
/// # Safety
/// `block` must be a valid, non-null Objective-C block object pointer.
#[inline]
pub(crate) unsafe fn invoke_ptr(block: *const c_void) -> *const c_void {
    // SAFETY: caller guarantees `block` points at a block literal.
    unsafe { (*(block as *const ObjCBlockLiteral)).invoke }
}
