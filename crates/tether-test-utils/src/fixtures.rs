//! A scripted dispatcher with one method per call shape.

use tether_core::{DispatchError, MethodRouter, StreamError};

pub const PING: &str = "ping";
pub const ECHO: &str = "/test.Echo/Unary";
pub const EMPTY: &str = "/test.Echo/Empty";
pub const FAIL: &str = "/test.Fail/Unary";
pub const DEADLINE: &str = "/test.Meta/Deadline";
/// Server stream: the first request byte `n` yields chunks `[0]`, `[1]`, … `[n-1]`.
pub const COUNT: &str = "/test.Count/Up";
/// Client stream: responds once with every input chunk concatenated.
pub const CONCAT: &str = "/test.Concat/Collect";
/// Bidi: echoes each input chunk until input closes.
pub const CHAT: &str = "/test.Echo/Chat";
/// Server stream whose handler panics.
pub const PANIC_STREAM: &str = "/test.Panic/Stream";
/// Server stream that sets a header and a trailer around one chunk.
pub const ANNOTATED: &str = "/test.Meta/Annotated";

/// Router with every fixture method registered.
pub fn scripted_router() -> MethodRouter {
    MethodRouter::new()
        .unary(PING, |_, _| Ok(b"pong".to_vec()))
        .unary(ECHO, |payload, _| Ok(payload.to_vec()))
        .unary(EMPTY, |_, _| Ok(Vec::new()))
        .unary(FAIL, |_, _| {
            Err(DispatchError::Failed {
                reason: "scripted failure".into(),
            })
        })
        .unary(DEADLINE, |_, meta| {
            Ok(meta
                .timeout()
                .map(|t| t.as_millis().to_string().into_bytes())
                .unwrap_or_default())
        })
        .server_stream(COUNT, |request, io| {
            let n = request.first().copied().unwrap_or(0);
            for i in 0..n {
                io.send(vec![i])?;
            }
            Ok(())
        })
        .client_stream(CONCAT, |io| {
            let mut all = Vec::new();
            while let Some(chunk) = io.recv()? {
                all.extend_from_slice(&chunk);
            }
            io.send(all)
        })
        .bidi(CHAT, |io| {
            while let Some(chunk) = io.recv()? {
                io.send(chunk)?;
            }
            Ok(())
        })
        .server_stream(PANIC_STREAM, |_, _| -> Result<(), StreamError> {
            panic!("scripted stream panic")
        })
        .server_stream(ANNOTATED, |_, io| {
            io.set_header("x-fixture", "annotated");
            io.set_trailer("x-status", "ok");
            io.send(b"body".to_vec())
        })
}
