//! Cache façade entry points.
//!
//! Four operations keyed by `(store, key)`, delegating to the server's
//! cache collaborator. All of them fail with `CacheDisabled` unless the
//! server was started with `enable_cache == 1` and a non-empty cache path.
//! A `ttl_seconds <= 0` entry never expires.

use std::os::raw::c_char;

use tracing::debug;

use tether_core::CacheError;
use tether_engine::CacheStore;

use crate::envelope::TetherBuffer;
use crate::runtime::current_server;
use crate::status::TetherStatus;
use crate::{byte_slice, req_str};

/// Resolve both names and run `op` against the live cache.
fn with_cache<T>(
    store: *const c_char,
    key: *const c_char,
    op: impl FnOnce(&dyn CacheStore, &str, &str) -> Result<T, CacheError>,
) -> Result<T, TetherStatus> {
    let store = req_str(store)?;
    let key = req_str(key)?;
    let server = current_server()?;
    let cache = server.cache().map_err(|e| TetherStatus::from(&e))?;
    op(cache, store, key).map_err(|e| {
        debug!(store, key, error = %e, "cache operation failed");
        TetherStatus::from(&e)
    })
}

/// Look up `(store, key)`.
///
/// A hit returns the value (release it with `tether_free`); a miss or an
/// expired entry returns a successful empty envelope; a failure has a
/// negative length.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_cache_get(store: *const c_char, key: *const c_char) -> TetherBuffer {
    ffi_guard_or!(TetherBuffer::failure("panic at ffi boundary"), {
        match with_cache(store, key, |c, s, k| c.get(s, k)) {
            Ok(Some(v)) => TetherBuffer::from_vec(v),
            Ok(None) => TetherBuffer::empty(),
            Err(s) => TetherBuffer::failure(&format!("cache get failed: status {}", s as i32)),
        }
    })
}

/// Store a copy of `len` bytes at `data` under `(store, key)`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_cache_put(
    store: *const c_char,
    key: *const c_char,
    data: *const u8,
    len: i64,
    ttl_seconds: i64,
) -> i32 {
    ffi_guard!({
        let value = match byte_slice(data, len) {
            Ok(v) => v.to_vec(),
            Err(s) => return s as i32,
        };
        match with_cache(store, key, |c, s, k| c.put(s, k, value, ttl_seconds)) {
            Ok(()) => TetherStatus::Ok as i32,
            Err(s) => s as i32,
        }
    })
}

/// 1 if `(store, key)` holds a live entry, 0 if not, negative on failure.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_cache_contains(store: *const c_char, key: *const c_char) -> i32 {
    ffi_guard!({
        match with_cache(store, key, |c, s, k| c.contains(s, k)) {
            Ok(present) => i32::from(present),
            Err(s) => s as i32,
        }
    })
}

/// Remove `(store, key)`. Removing an absent key is `Ok`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_cache_delete(store: *const c_char, key: *const c_char) -> i32 {
    ffi_guard!({
        match with_cache(store, key, |c, s, k| c.delete(s, k)) {
            Ok(()) => TetherStatus::Ok as i32,
            Err(s) => s as i32,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{register_dispatcher, take_dispatcher, tether_start_server, tether_stop_server};
    use crate::{tether_free, TetherServerConfig};
    use serial_test::serial;
    use std::ffi::CString;
    use std::sync::Arc;

    fn start(enable_cache: i32) {
        tether_stop_server();
        let _ = take_dispatcher();
        register_dispatcher(Arc::new(tether_test_utils::fixtures::scripted_router())).unwrap();
        let path = CString::new("/tmp/tether-cache").unwrap();
        let cfg = TetherServerConfig {
            cache_path: path.as_ptr(),
            enable_cache,
            ..TetherServerConfig::default()
        };
        assert_eq!(tether_start_server(&cfg), 0);
    }

    #[test]
    #[serial]
    fn disabled_cache_reports_disabled() {
        start(0);
        let s = CString::new("s").unwrap();
        let k = CString::new("k").unwrap();
        assert_eq!(
            tether_cache_contains(s.as_ptr(), k.as_ptr()),
            TetherStatus::CacheDisabled as i32
        );
        let b = tether_cache_get(s.as_ptr(), k.as_ptr());
        assert!(b.is_failure());
        tether_free(b.data);
        tether_stop_server();
    }

    #[test]
    #[serial]
    fn contains_reflects_put_and_delete() {
        start(1);
        let s = CString::new("prefs").unwrap();
        let k = CString::new("theme").unwrap();
        assert_eq!(tether_cache_contains(s.as_ptr(), k.as_ptr()), 0);
        let v = b"dark";
        assert_eq!(
            tether_cache_put(s.as_ptr(), k.as_ptr(), v.as_ptr(), v.len() as i64, -5),
            0
        );
        assert_eq!(tether_cache_contains(s.as_ptr(), k.as_ptr()), 1);
        assert_eq!(tether_cache_delete(s.as_ptr(), k.as_ptr()), 0);
        assert_eq!(tether_cache_delete(s.as_ptr(), k.as_ptr()), 0);
        assert_eq!(tether_cache_contains(s.as_ptr(), k.as_ptr()), 0);
        tether_stop_server();
    }

    #[test]
    #[serial]
    fn null_names_are_invalid() {
        start(1);
        let k = CString::new("k").unwrap();
        assert_eq!(
            tether_cache_delete(std::ptr::null(), k.as_ptr()),
            TetherStatus::InvalidArgument as i32
        );
        tether_stop_server();
    }
}
