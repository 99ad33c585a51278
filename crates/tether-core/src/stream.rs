//! Streaming shapes, delivery kinds, and the handler-side stream surface.

use crate::error::StreamError;
use crate::id::SessionId;

/// Directional shape of a streaming session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamShape {
    /// One request in, zero or more responses out.
    ServerStream,
    /// Zero or more requests in, exactly one response out.
    ClientStream,
    /// Independent input and output halves.
    Bidi,
}

impl StreamShape {
    /// Whether the front end may push input chunks into this shape.
    pub fn accepts_input(self) -> bool {
        !matches!(self, Self::ServerStream)
    }
}

impl std::fmt::Display for StreamShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServerStream => write!(f, "server-stream"),
            Self::ClientStream => write!(f, "client-stream"),
            Self::Bidi => write!(f, "bidi"),
        }
    }
}

/// Kind tag carried with every delivery to the front end.
///
/// Values are ABI-stable. `1` is reserved for a start notification and is
/// never emitted.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamMsgKind {
    /// One response payload.
    Data = 2,
    /// The output half closed normally.
    End = 3,
    /// The session failed; payload is a UTF-8 description.
    Error = 4,
    /// Trailers (`key=value\n`), sent right before [`End`](Self::End).
    Trailer = 5,
    /// Headers (`key=value\n`), sent before the first data payload.
    Header = 6,
}

impl StreamMsgKind {
    /// Whether this delivery closes the output half.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::End | Self::Error)
    }
}

/// The view a stream handler has of its session.
///
/// Implemented by the engine for each live session. Handlers run on their
/// own thread, so every method may block.
pub trait StreamIo {
    /// The session this handler serves.
    fn session_id(&self) -> SessionId;

    /// The session's shape.
    fn shape(&self) -> StreamShape;

    /// Next input chunk from the front end, in send order.
    ///
    /// Returns `Ok(None)` once the input half is closed and drained (always,
    /// for server-streaming sessions). Returns an error if the session was
    /// cancelled, timed out, or the server is shutting down.
    fn recv(&mut self) -> Result<Option<Vec<u8>>, StreamError>;

    /// Deliver one response payload to the front end.
    ///
    /// Payloads sent before the front end signals readiness are buffered
    /// and flushed in order. A client-streaming session accepts exactly one.
    fn send(&mut self, payload: Vec<u8>) -> Result<(), StreamError>;

    /// Close the output half (delivers trailers, then `End`) while input
    /// stays open. Returning from the handler does this implicitly.
    fn close_send(&mut self) -> Result<(), StreamError>;

    /// Queue a header, delivered once before the first payload.
    fn set_header(&mut self, key: &str, value: &str);

    /// Queue a trailer, delivered right before `End`.
    fn set_trailer(&mut self, key: &str, value: &str);
}

/// Business logic for one streaming session.
///
/// Returning `Ok(())` ends the stream normally; returning an error delivers
/// an [`Error`](StreamMsgKind::Error) to the front end.
pub type StreamHandler =
    Box<dyn FnOnce(&mut dyn StreamIo) -> Result<(), StreamError> + Send + 'static>;
