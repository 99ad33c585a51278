//! Benchmark profiles and utilities for the Tether bridge.
//!
//! Provides a fixed dispatcher and payload generator so the benches measure
//! the bridge rather than business logic:
//!
//! - [`bench_router`]: echo, fixed-reply and counting stream methods
//! - [`bench_server`]: a started [`Server`] over [`bench_router`]
//! - [`payload`]: deterministic payload of a given size

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use tether_core::MethodRouter;
use tether_engine::{ConfigError, Server, ServerConfig, StreamSink};

/// Echoes the request payload.
pub const ECHO: &str = "/bench.Echo/Unary";
/// Returns a fixed 16-byte reply regardless of input.
pub const FIXED: &str = "/bench.Fixed/Unary";
/// Server stream: emits `request[0]` chunks of 64 bytes each.
pub const BURST: &str = "/bench.Burst/Stream";

/// Router with the benchmark methods registered.
pub fn bench_router() -> MethodRouter {
    MethodRouter::new()
        .unary(ECHO, |payload, _| Ok(payload.to_vec()))
        .unary(FIXED, |_, _| Ok(vec![0xAB; 16]))
        .server_stream(BURST, |request, io| {
            let n = request.first().copied().unwrap_or(0);
            for i in 0..n {
                io.send(vec![i; 64])?;
            }
            Ok(())
        })
}

/// Start a server over [`bench_router`] with default tuning.
pub fn bench_server(sink: Arc<dyn StreamSink>) -> Result<Server, ConfigError> {
    Server::builder(ServerConfig::default(), Arc::new(bench_router()))
        .stream_sink(sink)
        .start()
}

/// Deterministic payload of `len` bytes derived from `seed`.
pub fn payload(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            // xorshift64
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{Reply, SessionId, StreamMsgKind};

    #[test]
    fn payload_is_deterministic() {
        assert_eq!(payload(32, 7), payload(32, 7));
        assert_ne!(payload(32, 7), payload(32, 8));
        assert_eq!(payload(0, 1).len(), 0);
    }

    #[test]
    fn router_serves_bench_methods() {
        let sink = Arc::new(|_: SessionId, _: StreamMsgKind, _: Vec<u8>| {});
        let server = bench_server(sink).unwrap();
        let p = payload(100, 3);
        assert_eq!(server.invoke_unary(ECHO, &p), Reply::Payload(p));
        assert_eq!(
            server.invoke_unary(FIXED, &[]),
            Reply::Payload(vec![0xAB; 16])
        );
    }
}
