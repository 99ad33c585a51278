//! Unary invocation entry points.

use std::os::raw::c_char;

use tether_core::Metadata;

use crate::envelope::TetherBuffer;
use crate::runtime::current_server;
use crate::status::TetherStatus;
use crate::{byte_slice, req_str};

fn rejected(s: TetherStatus) -> TetherBuffer {
    TetherBuffer::failure(&format!("invalid call: status {}", s as i32))
}

fn invoke(method: *const c_char, data: *const u8, len: i64, metadata: Option<&[u8]>) -> TetherBuffer {
    let method = match req_str(method) {
        Ok(m) => m,
        Err(s) => return rejected(s),
    };
    let payload = match byte_slice(data, len) {
        Ok(p) => p,
        Err(s) => return rejected(s),
    };
    let metadata = metadata.map(Metadata::parse).unwrap_or_default();
    match current_server() {
        Ok(server) => server.invoke_unary_with_metadata(method, payload, &metadata).into(),
        Err(_) => TetherBuffer::failure("server not started"),
    }
}

/// Run a unary call and return its reply.
///
/// Blocks until the dispatcher returns. The result is always owned by the
/// caller: release a non-null `data` with `tether_free`. A negative `len`
/// means failure, with a UTF-8 diagnostic in `data` when non-null.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_invoke(method: *const c_char, data: *const u8, len: i64) -> TetherBuffer {
    ffi_guard_or!(TetherBuffer::failure("panic at ffi boundary"), {
        invoke(method, data, len, None)
    })
}

/// Like [`tether_invoke`], with a metadata side channel.
///
/// `metadata` holds `key=value` lines; `__timeout_ms` sets the call
/// deadline. It is handed to the dispatcher next to, never merged into,
/// the payload. Null or zero-length metadata is empty.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_invoke_with_metadata(
    method: *const c_char,
    data: *const u8,
    len: i64,
    metadata: *const u8,
    metadata_len: i64,
) -> TetherBuffer {
    ffi_guard_or!(TetherBuffer::failure("panic at ffi boundary"), {
        let raw = match byte_slice(metadata, metadata_len) {
            Ok(m) => m,
            Err(s) => return rejected(s),
        };
        invoke(method, data, len, Some(raw))
    })
}
