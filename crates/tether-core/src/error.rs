//! Error types for the Tether bridge.
//!
//! Organized by subsystem: dispatch (unary and stream-open), streaming
//! sessions, reverse calls, and the cache collaborator. Every variant has a
//! fixed status code at the C boundary (see `tether-ffi`'s `TetherStatus`),
//! so nothing here ever needs to unwind across the ABI.

use std::any::Any;
use std::error::Error;
use std::fmt;

use crate::id::{RequestId, SessionId};

/// Errors from routing a call to business logic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchError {
    /// No handler is registered under the method path.
    MethodNotFound {
        /// The requested method path.
        method: String,
    },
    /// The method exists but was called with the wrong shape
    /// (e.g. a unary method opened as a stream).
    WrongShape {
        /// The requested method path.
        method: String,
    },
    /// The handler ran and reported a failure.
    Failed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The handler panicked; the panic was contained at the dispatch boundary.
    Panicked {
        /// The panic payload, if it was a string.
        message: String,
    },
    /// No server is running to dispatch the call.
    Unavailable,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MethodNotFound { method } => write!(f, "method '{method}' not found"),
            Self::WrongShape { method } => {
                write!(f, "method '{method}' does not support this call shape")
            }
            Self::Failed { reason } => write!(f, "handler failed: {reason}"),
            Self::Panicked { message } => write!(f, "handler panicked: {message}"),
            Self::Unavailable => write!(f, "server not started"),
        }
    }
}

impl Error for DispatchError {}

/// Errors from streaming-session operations.
///
/// Returned both to the front end (through the session manager) and to
/// stream handlers (through [`StreamIo`](crate::stream::StreamIo)).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamError {
    /// The session id was never issued.
    SessionNotFound {
        /// The unknown id.
        session: SessionId,
    },
    /// Input was sent after the input half closed.
    InputClosed {
        /// The session whose input is closed.
        session: SessionId,
    },
    /// The operation does not apply to this session's shape
    /// (e.g. sending input to a server-streaming session).
    WrongShape {
        /// The session the operation targeted.
        session: SessionId,
    },
    /// The session was closed by the front end.
    SessionClosed {
        /// The closed session.
        session: SessionId,
    },
    /// The session exceeded the configured idle timeout.
    Timeout {
        /// The expired session.
        session: SessionId,
    },
    /// A client-streaming handler tried to send a second response.
    ResponseAlreadySent {
        /// The session that already responded.
        session: SessionId,
    },
    /// The handler reported a failure.
    HandlerFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The session could not be opened.
    OpenFailed(DispatchError),
    /// The server is shutting down.
    ShuttingDown,
}

impl StreamError {
    /// Convenience constructor for handler-side failures.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::HandlerFailed {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound { session } => write!(f, "stream {session} not found"),
            Self::InputClosed { session } => write!(f, "stream {session} input is closed"),
            Self::WrongShape { session } => {
                write!(f, "operation not valid for the shape of stream {session}")
            }
            Self::SessionClosed { session } => write!(f, "stream {session} is closed"),
            Self::Timeout { session } => write!(f, "stream {session} timed out"),
            Self::ResponseAlreadySent { session } => {
                write!(f, "stream {session} already sent its response")
            }
            Self::HandlerFailed { reason } => write!(f, "stream handler failed: {reason}"),
            Self::OpenFailed(e) => write!(f, "failed to open stream: {e}"),
            Self::ShuttingDown => write!(f, "server is shutting down"),
        }
    }
}

impl Error for StreamError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::OpenFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DispatchError> for StreamError {
    fn from(e: DispatchError) -> Self {
        Self::OpenFailed(e)
    }
}

/// Errors from calls initiated by the native core into the front end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReverseCallError {
    /// No front-end callback is registered.
    NoCallback,
    /// The front end did not answer within the configured timeout.
    Timeout {
        /// The unanswered request.
        request: RequestId,
    },
    /// A response named an id that was never issued.
    UnknownRequest {
        /// The unknown id.
        request: RequestId,
    },
    /// A response arrived for a call that already completed, timed out,
    /// or was cancelled.
    AlreadyCompleted {
        /// The id that was delivered twice.
        request: RequestId,
    },
    /// The call was cancelled (callback re-registered or server stopped).
    Cancelled {
        /// The cancelled request.
        request: RequestId,
    },
    /// The method name cannot be handed to the front end (embedded NUL).
    InvalidMethod {
        /// The rejected method.
        method: String,
    },
    /// The payload could not be copied into a buffer for the front end.
    AllocationFailed {
        /// Requested byte count.
        len: usize,
    },
}

impl fmt::Display for ReverseCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCallback => write!(f, "front-end callback not registered"),
            Self::Timeout { request } => {
                write!(f, "timed out waiting for front-end response to request {request}")
            }
            Self::UnknownRequest { request } => write!(f, "request {request} was never issued"),
            Self::AlreadyCompleted { request } => {
                write!(f, "request {request} already completed")
            }
            Self::Cancelled { request } => write!(f, "request {request} was cancelled"),
            Self::InvalidMethod { method } => {
                write!(f, "method {method:?} cannot cross the boundary")
            }
            Self::AllocationFailed { len } => {
                write!(f, "could not allocate {len} bytes for the front end")
            }
        }
    }
}

impl Error for ReverseCallError {}

/// Errors from the cache collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheError {
    /// The cache is not enabled for this server.
    Disabled,
    /// Store name or key was empty.
    InvalidKey,
    /// The backing store failed.
    Backend {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "cache is disabled"),
            Self::InvalidKey => write!(f, "store name and key must be non-empty"),
            Self::Backend { reason } => write!(f, "cache backend failed: {reason}"),
        }
    }
}

impl Error for CacheError {}

/// Best-effort text of a caught panic payload.
///
/// Handler panics become `HandlerFailed` reasons and ABI panics become the
/// last-panic message; both go through here.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
