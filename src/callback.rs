//! Glue between libopusfile's read callback and a Rust read source.
//!
//! libopusfile pulls bytes through an `OpusFileCallbacks` table and hands an
//! opaque `void *` back to every call. The table lives in a `static` so its
//! address stays valid for as long as any `OggOpusFile` refers to it. The
//! context is a [`ContextHandle`], an integer naming a host-side session. It
//! only becomes a pointer at the native boundary, and that conversion keeps
//! the bit pattern. It never dereferences anything.

use std::{
    os::raw::{c_int, c_uchar, c_void},
    panic::{self, AssertUnwindSafe},
    ptr::{self, NonNull},
    slice,
};

use crate::opus_sys;

/// Host side of the read callback.
pub trait StreamSource: Send {
    /// Fills `buf` with up to `buf.len()` bytes.
    ///
    /// Returns the number of bytes written, `0` at end of stream, or a negative
    /// value if the source failed and decoding must stop.
    fn read_into(&mut self, buf: &mut [u8]) -> c_int;

    /// Hands back the error that caused the last negative return, if any.
    fn take_error(&mut self) -> Option<std::io::Error> {
        None
    }
}

/// The session object a [`ContextHandle`] refers to.
pub type BoxedSource = Box<dyn StreamSource>;

/// Opaque, pointer-sized name of a host-side read session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextHandle(usize);

impl ContextHandle {
    pub const fn from_raw(raw: usize) -> Self {
        ContextHandle(raw)
    }

    pub const fn into_raw(self) -> usize {
        self.0
    }

    /// Names the session stored at `source`. The allocation must outlive every
    /// native call made with the returned handle.
    pub fn for_source(source: *mut BoxedSource) -> Self {
        ContextHandle(source.expose_provenance())
    }

    /// Bit-preserving conversion to the native context pointer. Not a dereference.
    pub fn as_context(self) -> *mut c_void {
        ptr::with_exposed_provenance_mut(self.0)
    }

    /// Inverse of [`ContextHandle::as_context`].
    pub fn from_context(context: *mut c_void) -> Self {
        ContextHandle(context.addr())
    }

    /// # Safety
    ///
    /// The handle must be null or come from [`ContextHandle::for_source`] with
    /// the source still alive and not otherwise borrowed.
    unsafe fn source<'a>(self) -> Option<&'a mut BoxedSource> {
        let source: *mut BoxedSource = ptr::with_exposed_provenance_mut(self.0);
        source.as_mut()
    }
}

static REGISTRATION: opus_sys::OpusFileCallbacks = opus_sys::OpusFileCallbacks {
    read: Some(read_callback),
    seek: None,
    tell: None,
    close: None,
};

/// The process-wide callback table handed to every `op_open_callbacks` call.
pub fn registration() -> &'static opus_sys::OpusFileCallbacks {
    &REGISTRATION
}

/// Forwards a read request to the session named by `handle`.
///
/// The count (or error) reported by the source is returned as is. A null
/// handle reports `-1`.
///
/// # Safety
///
/// `handle` must satisfy the contract of [`ContextHandle::for_source`].
pub unsafe fn proxy_read(handle: ContextHandle, buf: &mut [u8]) -> c_int {
    match handle.source() {
        Some(source) => source.read_into(buf),
        None => -1,
    }
}

unsafe extern "C" fn read_callback(context: *mut c_void, ptr: *mut c_uchar, nbytes: c_int) -> c_int {
    let len = nbytes.max(0) as usize;
    let buf: &mut [u8] = if len == 0 {
        &mut []
    } else if ptr.is_null() {
        return -1;
    } else {
        slice::from_raw_parts_mut(ptr, len)
    };

    // unwinding into libopusfile is undefined
    panic::catch_unwind(AssertUnwindSafe(|| proxy_read(ContextHandle::from_context(context), buf))).unwrap_or(-1)
}

/// Opens an Ogg Opus stream that pulls its bytes through [`registration`].
///
/// The native error code is returned untouched on failure. The caller owns the
/// returned file and must release it with `op_free`.
///
/// # Safety
///
/// `handle` must satisfy the contract of [`ContextHandle::for_source`] for the
/// whole lifetime of the returned file.
pub unsafe fn open_with_context(handle: ContextHandle) -> Result<NonNull<opus_sys::OggOpusFile>, c_int> {
    let mut error: c_int = 0;
    let file = opus_sys::op_open_callbacks(handle.as_context(), registration(), ptr::null(), 0, &mut error);

    match NonNull::new(file) {
        Some(file) if error == 0 => Ok(file),
        Some(file) => {
            opus_sys::op_free(file.as_ptr());
            Err(error)
        }
        None if error != 0 => Err(error),
        None => Err(opus_sys::OP_EFAULT),
    }
}
