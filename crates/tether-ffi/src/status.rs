//! C-compatible status codes.
//!
//! [`TetherStatus`] is a `repr(i32)` enum covering every failure the
//! boundary can report. Conversions from each subsystem's error type are
//! provided so entry points can write `TetherStatus::from(&e) as i32`.

use tether_core::{CacheError, DispatchError, ReverseCallError, StreamError};
use tether_engine::ConfigError;

use crate::runtime::RegistrationError;

/// C-compatible status code returned by FFI functions.
///
/// `Ok` = 0, all errors are negative. Values are ABI-stable.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TetherStatus {
    /// Success.
    Ok = 0,
    /// An argument is null, negative, not UTF-8, or otherwise invalid.
    InvalidArgument = -1,
    /// Unknown method, session, or reverse-call request id.
    NotFound = -2,
    /// A boundary buffer could not be allocated (for example a reverse-call
    /// payload bound for the front end).
    AllocationFailed = -3,
    /// The operation is invalid for the session's current state or shape
    /// (e.g. send after input close).
    ProtocolViolation = -4,
    /// A session or reverse call exceeded its timeout.
    Timeout = -5,
    /// The target already reached a terminal state (closed session,
    /// already-answered reverse call).
    AlreadyTerminal = -6,
    /// The server is running, or a callback is already registered while it runs.
    AlreadyStarted = -7,
    /// The server is not running.
    NotStarted = -8,
    /// Configuration validation error.
    ConfigError = -9,
    /// No dispatcher was registered before start.
    NoDispatcher = -10,
    /// The cache is not enabled.
    CacheDisabled = -11,
    /// The dispatcher or a stream handler reported a failure.
    DispatchFailed = -12,
    /// The server is shutting down.
    ShuttingDown = -13,
    /// No front-end callback is registered.
    Unavailable = -14,
    /// A pending reverse call was cancelled.
    Cancelled = -15,
    /// Internal error (e.g. poisoned mutex after a prior panic).
    InternalError = -20,
    /// A Rust panic was caught at the FFI boundary.
    Panicked = -128,
}

impl From<&DispatchError> for TetherStatus {
    fn from(e: &DispatchError) -> Self {
        match e {
            DispatchError::MethodNotFound { .. } => TetherStatus::NotFound,
            DispatchError::WrongShape { .. } => TetherStatus::ProtocolViolation,
            DispatchError::Failed { .. } => TetherStatus::DispatchFailed,
            DispatchError::Panicked { .. } => TetherStatus::Panicked,
            DispatchError::Unavailable => TetherStatus::NotStarted,
        }
    }
}

impl From<&StreamError> for TetherStatus {
    fn from(e: &StreamError) -> Self {
        match e {
            StreamError::SessionNotFound { .. } => TetherStatus::NotFound,
            StreamError::InputClosed { .. }
            | StreamError::WrongShape { .. }
            | StreamError::ResponseAlreadySent { .. } => TetherStatus::ProtocolViolation,
            StreamError::SessionClosed { .. } => TetherStatus::AlreadyTerminal,
            StreamError::Timeout { .. } => TetherStatus::Timeout,
            StreamError::HandlerFailed { .. } => TetherStatus::DispatchFailed,
            StreamError::OpenFailed(inner) => TetherStatus::from(inner),
            StreamError::ShuttingDown => TetherStatus::ShuttingDown,
        }
    }
}

impl From<&ReverseCallError> for TetherStatus {
    fn from(e: &ReverseCallError) -> Self {
        match e {
            ReverseCallError::NoCallback => TetherStatus::Unavailable,
            ReverseCallError::Timeout { .. } => TetherStatus::Timeout,
            ReverseCallError::UnknownRequest { .. } => TetherStatus::NotFound,
            ReverseCallError::AlreadyCompleted { .. } => TetherStatus::AlreadyTerminal,
            ReverseCallError::Cancelled { .. } => TetherStatus::Cancelled,
            ReverseCallError::InvalidMethod { .. } => TetherStatus::InvalidArgument,
            ReverseCallError::AllocationFailed { .. } => TetherStatus::AllocationFailed,
        }
    }
}

impl From<&CacheError> for TetherStatus {
    fn from(e: &CacheError) -> Self {
        match e {
            CacheError::Disabled => TetherStatus::CacheDisabled,
            CacheError::InvalidKey => TetherStatus::InvalidArgument,
            CacheError::Backend { .. } => TetherStatus::InternalError,
        }
    }
}

impl From<&ConfigError> for TetherStatus {
    fn from(_e: &ConfigError) -> Self {
        TetherStatus::ConfigError
    }
}

impl From<&RegistrationError> for TetherStatus {
    fn from(e: &RegistrationError) -> Self {
        match e {
            RegistrationError::AlreadyStarted => TetherStatus::AlreadyStarted,
        }
    }
}
