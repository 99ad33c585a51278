//! C ABI for the Tether native RPC bridge.
//!
//! Exposes unary calls, the three streaming shapes, reverse calls into the
//! front end, and the cache façade over a single C-compatible surface.
//! This is the only Tether crate that contains `unsafe` code; every
//! entry point opts in with a scoped `#[allow(unsafe_code)]`.
//!
//! Every `extern "C"` body runs inside [`ffi_guard!`] so a Rust panic is
//! caught at the boundary, recorded for [`tether_last_panic_message`], and
//! turned into [`TetherStatus::Panicked`](status::TetherStatus::Panicked).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

use std::cell::RefCell;
use std::ffi::CStr;
use std::os::raw::c_char;

thread_local! {
    /// Message of the most recent panic caught on this thread.
    pub(crate) static LAST_PANIC: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Run `$body`, converting a panic into `$on_panic`.
macro_rules! ffi_guard_or {
    ($on_panic:expr, $body:block) => {{
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| $body)) {
            Ok(v) => v,
            Err(payload) => {
                let msg = tether_core::panic_message(payload.as_ref());
                tracing::error!(panic = %msg, "panic caught at ffi boundary");
                $crate::LAST_PANIC.with(|cell| *cell.borrow_mut() = msg);
                $on_panic
            }
        }
    }};
}

/// Run an `i32`-status body, converting a panic into `Panicked`.
macro_rules! ffi_guard {
    ($body:block) => {
        ffi_guard_or!($crate::status::TetherStatus::Panicked as i32, $body)
    };
}

/// Lock a mutex, returning `InternalError` (or `$on_poison`) if poisoned.
macro_rules! ffi_lock {
    ($m:expr) => {
        ffi_lock!($m, $crate::status::TetherStatus::InternalError as i32)
    };
    ($m:expr, $on_poison:expr) => {
        match $m.lock() {
            Ok(guard) => guard,
            Err(_) => return $on_poison,
        }
    };
}

pub mod cache;
pub mod config;
pub mod envelope;
pub mod reverse;
pub mod runtime;
pub mod status;
pub mod stream;
pub mod unary;

pub use config::TetherServerConfig;
pub use envelope::{tether_free, TetherBuffer};
pub use runtime::{register_dispatcher, reverse_call, RegistrationError};
pub use status::TetherStatus;

/// Borrow a NUL-terminated UTF-8 string. Null and empty both read as `None`.
#[allow(unsafe_code)]
pub(crate) fn opt_str<'a>(p: *const c_char) -> Result<Option<&'a str>, TetherStatus> {
    if p.is_null() {
        return Ok(None);
    }
    // SAFETY: caller passes a valid NUL-terminated string that outlives the call.
    let s = unsafe { CStr::from_ptr(p) }
        .to_str()
        .map_err(|_| TetherStatus::InvalidArgument)?;
    Ok((!s.is_empty()).then_some(s))
}

/// Like [`opt_str`] but the string is required.
pub(crate) fn req_str<'a>(p: *const c_char) -> Result<&'a str, TetherStatus> {
    opt_str(p)?.ok_or(TetherStatus::InvalidArgument)
}

/// Borrow `len` bytes at `data`. `len == 0` allows a null `data`.
#[allow(unsafe_code)]
pub(crate) fn byte_slice<'a>(data: *const u8, len: i64) -> Result<&'a [u8], TetherStatus> {
    let n = usize::try_from(len).map_err(|_| TetherStatus::InvalidArgument)?;
    if n == 0 {
        return Ok(&[]);
    }
    if data.is_null() {
        return Err(TetherStatus::InvalidArgument);
    }
    // SAFETY: caller guarantees `data` points at `len` readable bytes.
    Ok(unsafe { std::slice::from_raw_parts(data, n) })
}

/// Copy the most recent panic message caught on this thread into `buf`.
///
/// Writes at most `cap - 1` bytes plus a NUL terminator. Returns the full
/// message length in bytes (excluding the terminator), or 0 if no panic has
/// been recorded. Pass a null `buf` to query the length.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_last_panic_message(buf: *mut c_char, cap: usize) -> i32 {
    LAST_PANIC.with(|cell| {
        let msg = cell.borrow();
        let bytes = msg.as_bytes();
        if !buf.is_null() && cap > 0 {
            let n = bytes.len().min(cap - 1);
            // SAFETY: caller guarantees `buf` has room for `cap` bytes.
            unsafe {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf.cast::<u8>(), n);
                *buf.add(n) = 0;
            }
        }
        i32::try_from(bytes.len()).unwrap_or(i32::MAX)
    })
}
