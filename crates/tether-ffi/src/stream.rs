//! Streaming entry points and the stream delivery callback.
//!
//! Sessions are started with one of the three `*_stream_start` functions,
//! which return the session id (or a negative [`TetherStatus`]) without
//! waiting for the handler. Nothing is delivered for a session until the
//! front end calls [`tether_stream_ready`]; after that every message goes
//! through the registered [`TetherStreamCallback`] in order.

use std::os::raw::c_char;
use std::sync::Mutex;

use tracing::{debug, trace, warn};

use tether_core::{SessionId, StreamError, StreamMsgKind};
use tether_engine::StreamSink;

use crate::envelope::TetherBuffer;
use crate::runtime::{current_server, is_running};
use crate::status::TetherStatus;
use crate::{byte_slice, req_str};

/// Stream delivery callback.
///
/// Arguments: session id, message kind (`2` data, `3` end, `4` error,
/// `5` trailer, `6` header), payload pointer, payload length. Ownership of
/// a non-null payload passes to the callee, which must release it with
/// `tether_free`. Error payloads hold UTF-8 text; header and trailer
/// payloads hold `key=value\n` lines.
///
/// Called from arbitrary threads, serially per session.
pub type TetherStreamCallback =
    unsafe extern "C" fn(session_id: i64, kind: u8, data: *mut u8, len: i64);

static CALLBACK: Mutex<Option<TetherStreamCallback>> = Mutex::new(None);

/// Routes deliveries to the registered C callback.
pub(crate) struct FfiStreamSink;

impl StreamSink for FfiStreamSink {
    #[allow(unsafe_code)]
    fn deliver(&self, session: SessionId, kind: StreamMsgKind, payload: Vec<u8>) {
        // Copy the pointer out so the callback runs without the lock held.
        let callback = *CALLBACK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(callback) = callback else {
            trace!(session = %session, ?kind, "no stream callback; delivery dropped");
            return;
        };
        let buf = TetherBuffer::from_vec(payload);
        // SAFETY: the callback was registered by the front end as a valid
        // function of this signature; `buf` ownership is handed over.
        unsafe { callback(session.0, kind as u8, buf.data, buf.len) };
    }
}

/// Register the stream delivery callback.
///
/// The first registration is always accepted. Replacing or clearing (null)
/// an existing callback is accepted only while the server is stopped;
/// otherwise returns `AlreadyStarted`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_register_stream_callback(callback: Option<TetherStreamCallback>) -> i32 {
    ffi_guard!({
        let mut slot = ffi_lock!(CALLBACK);
        if slot.is_some() && is_running() {
            warn!("stream callback replacement rejected: server running");
            return TetherStatus::AlreadyStarted as i32;
        }
        *slot = callback;
        TetherStatus::Ok as i32
    })
}

fn session_status(r: Result<(), StreamError>) -> i32 {
    match r {
        Ok(()) => TetherStatus::Ok as i32,
        Err(e) => {
            debug!(error = %e, "stream operation rejected");
            TetherStatus::from(&e) as i32
        }
    }
}

fn start_status(r: Result<SessionId, StreamError>) -> i64 {
    match r {
        Ok(id) => id.0,
        Err(e) => {
            debug!(error = %e, "stream start failed");
            i64::from(TetherStatus::from(&e) as i32)
        }
    }
}

fn fail(s: TetherStatus) -> i64 {
    i64::from(s as i32)
}

/// Start a server-streaming session with its single request.
///
/// Returns the session id (`> 0`) or a negative status.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_server_stream_start(
    method: *const c_char,
    data: *const u8,
    len: i64,
) -> i64 {
    ffi_guard_or!(fail(TetherStatus::Panicked), {
        let method = match req_str(method) {
            Ok(m) => m,
            Err(s) => return fail(s),
        };
        let payload = match byte_slice(data, len) {
            Ok(p) => p,
            Err(s) => return fail(s),
        };
        match current_server() {
            Ok(server) => start_status(server.start_server_stream(method, payload)),
            Err(s) => fail(s),
        }
    })
}

/// Start a client-streaming session.
///
/// Returns the session id (`> 0`) or a negative status.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_client_stream_start(method: *const c_char) -> i64 {
    ffi_guard_or!(fail(TetherStatus::Panicked), {
        let method = match req_str(method) {
            Ok(m) => m,
            Err(s) => return fail(s),
        };
        match current_server() {
            Ok(server) => start_status(server.start_client_stream(method)),
            Err(s) => fail(s),
        }
    })
}

/// Start a bidirectional session.
///
/// Returns the session id (`> 0`) or a negative status.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_bidi_stream_start(method: *const c_char) -> i64 {
    ffi_guard_or!(fail(TetherStatus::Panicked), {
        let method = match req_str(method) {
            Ok(m) => m,
            Err(s) => return fail(s),
        };
        match current_server() {
            Ok(server) => start_status(server.start_bidi_stream(method)),
            Err(s) => fail(s),
        }
    })
}

/// Push one input chunk into a client-streaming or bidi session.
///
/// The bytes are copied. Sending after the input half closed is
/// `ProtocolViolation`; an unknown session is `NotFound`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_stream_send(session_id: i64, data: *const u8, len: i64) -> i32 {
    ffi_guard!({
        let payload = match byte_slice(data, len) {
            Ok(p) => p.to_vec(),
            Err(s) => return s as i32,
        };
        match current_server() {
            Ok(server) => session_status(server.send_stream_data(SessionId(session_id), payload)),
            Err(s) => s as i32,
        }
    })
}

/// Cancel a session. No further deliveries follow. Idempotent.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_stream_close(session_id: i64) -> i32 {
    ffi_guard!({
        match current_server() {
            Ok(server) => session_status(server.close_stream(SessionId(session_id))),
            Err(s) => s as i32,
        }
    })
}

/// Close a session's input half. Idempotent.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_stream_close_input(session_id: i64) -> i32 {
    ffi_guard!({
        match current_server() {
            Ok(server) => session_status(server.close_stream_input(SessionId(session_id))),
            Err(s) => s as i32,
        }
    })
}

/// Signal that the front end is ready to receive deliveries for a session.
/// Messages produced earlier are flushed in order.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_stream_ready(session_id: i64) -> i32 {
    ffi_guard!({
        match current_server() {
            Ok(server) => session_status(server.stream_ready(SessionId(session_id))),
            Err(s) => s as i32,
        }
    })
}
