//! Reverse calls: the native core calling into the front end.
//!
//! The front end registers one [`TetherReverseCallback`]. Each reverse call
//! gets a fresh request id and is handed to that callback; the front end
//! answers later, from any thread, with [`tether_deliver_reverse_response`].

use std::ffi::CString;
use std::os::raw::c_char;
use std::sync::Mutex;

use tracing::{debug, warn};

use tether_core::{RequestId, ReverseCallError};
use tether_engine::ReverseCallSink;

use crate::byte_slice;
use crate::envelope::TetherBuffer;
use crate::runtime::{current_server, is_running};
use crate::status::TetherStatus;

/// Reverse-call callback.
///
/// Arguments: request id, method (NUL-terminated, borrowed for the duration
/// of the call), payload pointer, payload length. Ownership of a non-null
/// payload passes to the callee, which must release it with `tether_free`.
///
/// Must not block waiting for its own answer.
pub type TetherReverseCallback =
    unsafe extern "C" fn(request_id: i64, method: *const c_char, data: *mut u8, len: i64);

static CALLBACK: Mutex<Option<TetherReverseCallback>> = Mutex::new(None);

/// Forwards reverse calls to the registered C callback.
pub(crate) struct FfiReverseSink;

impl ReverseCallSink for FfiReverseSink {
    #[allow(unsafe_code)]
    fn call(&self, request: RequestId, method: &str, payload: &[u8]) -> Result<(), ReverseCallError> {
        let callback = *CALLBACK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let callback = callback.ok_or(ReverseCallError::NoCallback)?;
        let method_c = CString::new(method).map_err(|_| ReverseCallError::InvalidMethod {
            method: method.to_string(),
        })?;
        let buf = TetherBuffer::try_from_bytes(payload).ok_or(ReverseCallError::AllocationFailed {
            len: payload.len(),
        })?;
        // SAFETY: the callback was registered by the front end as a valid
        // function of this signature. `method_c` outlives the call; `buf`
        // ownership is handed over.
        unsafe { callback(request.0, method_c.as_ptr(), buf.data, buf.len) };
        Ok(())
    }
}

/// Register the reverse-call callback.
///
/// The first registration is always accepted. Replacing or clearing (null)
/// an existing callback is accepted only while the server is stopped;
/// otherwise returns `AlreadyStarted`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_register_reverse_callback(callback: Option<TetherReverseCallback>) -> i32 {
    ffi_guard!({
        let mut slot = ffi_lock!(CALLBACK);
        if slot.is_some() && is_running() {
            warn!("reverse callback replacement rejected: server running");
            return TetherStatus::AlreadyStarted as i32;
        }
        *slot = callback;
        TetherStatus::Ok as i32
    })
}

/// Deliver the front end's answer to reverse call `request_id`.
///
/// The bytes are copied. A second answer for the same id is
/// `AlreadyTerminal`; an id that was never issued is `NotFound`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_deliver_reverse_response(request_id: i64, data: *const u8, len: i64) -> i32 {
    ffi_guard!({
        let payload = match byte_slice(data, len) {
            Ok(p) => p.to_vec(),
            Err(s) => return s as i32,
        };
        let server = match current_server() {
            Ok(s) => s,
            Err(s) => return s as i32,
        };
        match server.deliver_reverse_response(RequestId(request_id), payload) {
            Ok(()) => TetherStatus::Ok as i32,
            Err(e) => {
                debug!(error = %e, "reverse response rejected");
                TetherStatus::from(&e) as i32
            }
        }
    })
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::runtime::{register_dispatcher, reverse_call, take_dispatcher, tether_start_server, tether_stop_server};
    use crate::TetherServerConfig;
    use serial_test::serial;
    use std::sync::Arc;

    /// Answers every call synchronously with the reversed payload.
    unsafe extern "C" fn answer_reversed(id: i64, _method: *const c_char, data: *mut u8, len: i64) {
        let buf = TetherBuffer { data, len };
        let mut bytes = buf.copy_out().unwrap_or_default();
        crate::tether_free(data);
        bytes.reverse();
        tether_deliver_reverse_response(id, bytes.as_ptr(), bytes.len() as i64);
    }

    unsafe extern "C" fn record_method(_id: i64, method: *const c_char, data: *mut u8, _len: i64) {
        crate::tether_free(data);
        let m = std::ffi::CStr::from_ptr(method).to_string_lossy().into_owned();
        *SEEN.lock().unwrap() = Some(m);
    }

    static SEEN: Mutex<Option<String>> = Mutex::new(None);

    fn start_with(cb: TetherReverseCallback) {
        tether_stop_server();
        let _ = take_dispatcher();
        assert_eq!(tether_register_reverse_callback(Some(cb)), 0);
        register_dispatcher(Arc::new(tether_test_utils::fixtures::scripted_router())).unwrap();
        assert_eq!(tether_start_server(&TetherServerConfig::default()), 0);
    }

    #[test]
    #[serial]
    fn synchronous_answer_reaches_caller() {
        start_with(answer_reversed);
        assert_eq!(reverse_call("/ui.Echo/Reverse", &[1, 2, 3]), Ok(vec![3, 2, 1]));
        tether_stop_server();
    }

    #[test]
    #[serial]
    fn callback_sees_method() {
        start_with(record_method);
        let server = current_server().unwrap();
        let pending = server.begin_front_end_call("/ui.Toast/Show", b"hi").unwrap();
        assert_eq!(SEEN.lock().unwrap().as_deref(), Some("/ui.Toast/Show"));
        let id = pending.id().0;
        assert_eq!(tether_deliver_reverse_response(id, b"ok".as_ptr(), 2), 0);
        assert_eq!(pending.wait(), Ok(b"ok".to_vec()));
        assert_eq!(
            tether_deliver_reverse_response(id, std::ptr::null(), 0),
            TetherStatus::AlreadyTerminal as i32
        );
        drop(server);
        tether_stop_server();
    }

    #[test]
    #[serial]
    fn method_with_nul_is_rejected() {
        start_with(record_method);
        assert!(matches!(
            reverse_call("/ui.Bad\0/Method", &[]),
            Err(ReverseCallError::InvalidMethod { .. })
        ));
        tether_stop_server();
    }

    #[test]
    #[serial]
    fn unknown_request_is_not_found() {
        start_with(record_method);
        assert_eq!(
            tether_deliver_reverse_response(i64::MAX, std::ptr::null(), 0),
            TetherStatus::NotFound as i32
        );
        tether_stop_server();
        assert_eq!(
            tether_deliver_reverse_response(1, std::ptr::null(), 0),
            TetherStatus::NotStarted as i32
        );
    }
}
