//! The dispatch capability: method path + opaque payload → serialized reply.

use crate::error::DispatchError;
use crate::metadata::Metadata;
use crate::stream::{StreamHandler, StreamShape};

/// Routes calls to business logic.
///
/// `method` is an opaque routing string, conventionally a fully qualified
/// `/package.Service/Method` path. Payloads are already-serialized messages;
/// this layer never decodes them.
///
/// Implementations must tolerate concurrent calls: the server issues no
/// ordering between invocations of different methods, and none between
/// concurrent invocations of the same method either.
pub trait Dispatcher: Send + Sync {
    /// Run a unary call.
    ///
    /// `Ok` with an empty vector is a successful empty response, distinct
    /// from any `Err`.
    fn invoke(
        &self,
        method: &str,
        payload: &[u8],
        metadata: &Metadata,
    ) -> Result<Vec<u8>, DispatchError>;

    /// Resolve a streaming method to a handler for one session.
    ///
    /// `payload` is the initial request for server-streaming calls and empty
    /// otherwise. The default rejects every method, for dispatchers that
    /// serve unary calls only.
    fn open_stream(
        &self,
        shape: StreamShape,
        method: &str,
        payload: &[u8],
    ) -> Result<StreamHandler, DispatchError> {
        let _ = (shape, payload);
        Err(DispatchError::MethodNotFound {
            method: method.to_string(),
        })
    }
}

/// Outcome of a unary call, with success-empty kept apart from failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Successful, non-empty response.
    Payload(Vec<u8>),
    /// Successful, empty response.
    Empty,
    /// The call failed.
    Failed(DispatchError),
}

impl Reply {
    /// True for [`Payload`](Reply::Payload) and [`Empty`](Reply::Empty).
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    /// Convert back into a `Result`, with `Empty` as an empty vector.
    pub fn into_result(self) -> Result<Vec<u8>, DispatchError> {
        match self {
            Self::Payload(p) => Ok(p),
            Self::Empty => Ok(Vec::new()),
            Self::Failed(e) => Err(e),
        }
    }
}

impl From<Result<Vec<u8>, DispatchError>> for Reply {
    fn from(r: Result<Vec<u8>, DispatchError>) -> Self {
        match r {
            Ok(p) if p.is_empty() => Self::Empty,
            Ok(p) => Self::Payload(p),
            Err(e) => Self::Failed(e),
        }
    }
}
