//! Tether: a native RPC bridge between a Rust core and a managed front end.
//!
//! This is the top-level facade crate that re-exports the safe Rust API of
//! the Tether sub-crates. The C ABI itself lives in `tether-ffi`, which
//! builds the shared library and `include/tether.h`.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use tether::prelude::*;
//!
//! let router = MethodRouter::new()
//!     .unary("/greeter.Greeter/Hello", |payload, _meta| {
//!         let mut reply = b"hello ".to_vec();
//!         reply.extend_from_slice(payload);
//!         Ok(reply)
//!     })
//!     .server_stream("/greeter.Greeter/Count", |request, io| {
//!         for i in 0..request.first().copied().unwrap_or(0) {
//!             io.send(vec![i])?;
//!         }
//!         Ok(())
//!     });
//!
//! let server = Server::builder(ServerConfig::default(), Arc::new(router))
//!     .start()
//!     .unwrap();
//!
//! let reply = server.invoke_unary("/greeter.Greeter/Hello", b"world");
//! assert_eq!(reply, Reply::Payload(b"hello world".to_vec()));
//!
//! let missing = server.invoke_unary("/greeter.Greeter/Nope", &[]);
//! assert!(!missing.is_success());
//!
//! let report = server.shutdown();
//! assert_eq!(report.sessions_closed, 0);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `tether-core` | IDs, errors, metadata, `Dispatcher`, `MethodRouter`, stream I/O |
//! | [`engine`] | `tether-engine` | `Server`, session manager, reverse calls, cache, configuration |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`tether-core`).
///
/// Contains the error taxonomy, [`types::Metadata`], the
/// [`types::Dispatcher`] capability and the [`types::MethodRouter`]
/// implementation of it.
pub use tether_core as types;

/// Server context and its subsystems (`tether-engine`).
///
/// [`engine::Server`] owns the streaming session manager, the reverse-call
/// channel and the cache collaborator.
pub use tether_engine as engine;

/// Common imports for typical Tether usage.
///
/// ```rust
/// use tether::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use tether_core::{
        Dispatcher, Metadata, MethodRouter, Reply, RequestId, SessionId, StreamIo, StreamMsgKind,
        StreamShape,
    };

    // Errors
    pub use tether_core::{CacheError, DispatchError, ReverseCallError, StreamError};

    // Engine
    pub use tether_engine::{
        CacheStore, ConfigError, MemoryCache, ReverseCallSink, Server, ServerConfig, StreamSink,
    };
}
