//! Process-wide server slot and the start/stop entry points.
//!
//! The C ABI has no context argument, so the ffi crate keeps exactly one
//! [`Server`] in a global slot. The dispatcher is injected into that server
//! at start; registering a different dispatcher while it runs is an
//! explicit [`RegistrationError::AlreadyStarted`].
//!
//! The slot lock is held only for lookups and swaps. Shutdown runs after
//! the server has been taken out of the slot, so stream and reverse-call
//! callbacks fired during shutdown can re-enter the ABI.

use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use tether_core::{Dispatcher, ReverseCallError};
use tether_engine::Server;

use crate::config::TetherServerConfig;
use crate::reverse::FfiReverseSink;
use crate::status::TetherStatus;
use crate::stream::FfiStreamSink;

struct Runtime {
    dispatcher: Option<Arc<dyn Dispatcher>>,
    server: Option<Arc<Server>>,
}

static RUNTIME: Mutex<Runtime> = Mutex::new(Runtime {
    dispatcher: None,
    server: None,
});

fn runtime() -> MutexGuard<'static, Runtime> {
    RUNTIME.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Errors from the Rust-side registration API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationError {
    /// The server is running; stop it before swapping the dispatcher.
    AlreadyStarted,
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "server already started"),
        }
    }
}

impl Error for RegistrationError {}

/// Install the dispatcher the next `tether_start_server` will use.
///
/// Must be called before start. Replacing it while stopped is allowed.
pub fn register_dispatcher(dispatcher: Arc<dyn Dispatcher>) -> Result<(), RegistrationError> {
    let mut rt = runtime();
    if rt.server.is_some() {
        warn!("dispatcher registration rejected: server running");
        return Err(RegistrationError::AlreadyStarted);
    }
    rt.dispatcher = Some(dispatcher);
    Ok(())
}

/// Remove the registered dispatcher, returning it.
pub fn take_dispatcher() -> Result<Option<Arc<dyn Dispatcher>>, RegistrationError> {
    let mut rt = runtime();
    if rt.server.is_some() {
        return Err(RegistrationError::AlreadyStarted);
    }
    Ok(rt.dispatcher.take())
}

/// Whether a server is running.
pub fn is_running() -> bool {
    runtime().server.is_some()
}

/// The running server, or `NotStarted`.
pub(crate) fn current_server() -> Result<Arc<Server>, TetherStatus> {
    let rt = RUNTIME.lock().map_err(|_| TetherStatus::InternalError)?;
    rt.server.clone().ok_or(TetherStatus::NotStarted)
}

/// Call into the front end from Rust business logic and wait for the answer.
///
/// Fails with [`ReverseCallError::NoCallback`] when no server is running.
pub fn reverse_call(method: &str, payload: &[u8]) -> Result<Vec<u8>, ReverseCallError> {
    let server = runtime().server.clone().ok_or(ReverseCallError::NoCallback)?;
    server.call_front_end(method, payload)
}

/// Start the server from `config`.
///
/// Returns `AlreadyStarted` if one is running, `NoDispatcher` if
/// [`register_dispatcher`] was never called, `ConfigError` if validation
/// fails.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_start_server(config: *const TetherServerConfig) -> i32 {
    ffi_guard!({
        if config.is_null() {
            return TetherStatus::InvalidArgument as i32;
        }
        // SAFETY: `config` is non-null and the caller guarantees it points
        // at a valid TetherServerConfig for the duration of this call.
        let raw = unsafe { &*config };
        let config = match raw.to_server_config() {
            Ok(c) => c,
            Err(s) => return s as i32,
        };

        let mut rt = ffi_lock!(RUNTIME);
        if rt.server.is_some() {
            warn!("start rejected: server already running");
            return TetherStatus::AlreadyStarted as i32;
        }
        let Some(dispatcher) = rt.dispatcher.clone() else {
            return TetherStatus::NoDispatcher as i32;
        };
        let server = Server::builder(config, dispatcher)
            .stream_sink(Arc::new(FfiStreamSink))
            .reverse_sink(Arc::new(FfiReverseSink))
            .start();
        match server {
            Ok(s) => {
                rt.server = Some(Arc::new(s));
                TetherStatus::Ok as i32
            }
            Err(e) => {
                warn!(error = %e, "server start failed");
                TetherStatus::from(&e) as i32
            }
        }
    })
}

/// Stop the server. Live sessions receive an error delivery and pending
/// reverse calls are cancelled. Stopping a stopped server is `Ok`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn tether_stop_server() -> i32 {
    ffi_guard!({
        let server = ffi_lock!(RUNTIME).server.take();
        if let Some(server) = server {
            let report = server.shutdown();
            info!(
                sessions_closed = report.sessions_closed,
                pending_calls_cancelled = report.pending_calls_cancelled,
                "ffi server stopped"
            );
        }
        TetherStatus::Ok as i32
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::ffi::CString;
    use tether_test_utils::fixtures::scripted_router;

    fn reset() {
        tether_stop_server();
        let _ = take_dispatcher();
    }

    #[test]
    #[serial]
    fn start_requires_a_dispatcher() {
        reset();
        let cfg = TetherServerConfig::default();
        assert_eq!(tether_start_server(&cfg), TetherStatus::NoDispatcher as i32);
        assert!(!is_running());
    }

    #[test]
    #[serial]
    fn start_twice_is_already_started() {
        reset();
        register_dispatcher(Arc::new(scripted_router())).unwrap();
        let cfg = TetherServerConfig::default();
        assert_eq!(tether_start_server(&cfg), TetherStatus::Ok as i32);
        assert_eq!(tether_start_server(&cfg), TetherStatus::AlreadyStarted as i32);
        assert_eq!(
            register_dispatcher(Arc::new(scripted_router())),
            Err(RegistrationError::AlreadyStarted)
        );
        assert_eq!(tether_stop_server(), TetherStatus::Ok as i32);
        assert_eq!(tether_stop_server(), TetherStatus::Ok as i32);
        assert!(register_dispatcher(Arc::new(scripted_router())).is_ok());
        reset();
    }

    #[test]
    #[serial]
    fn bad_config_is_reported() {
        reset();
        register_dispatcher(Arc::new(scripted_router())).unwrap();
        let port = CString::new("not-a-port").unwrap();
        let cfg = TetherServerConfig {
            view_tcp_port: port.as_ptr(),
            ..TetherServerConfig::default()
        };
        assert_eq!(tether_start_server(&cfg), TetherStatus::ConfigError as i32);
        assert_eq!(
            tether_start_server(std::ptr::null()),
            TetherStatus::InvalidArgument as i32
        );
        assert!(!is_running());
        reset();
    }

    #[test]
    #[serial]
    fn reverse_call_without_server_has_no_callback() {
        reset();
        assert_eq!(reverse_call("/ui.A/B", &[]), Err(ReverseCallError::NoCallback));
    }
}
