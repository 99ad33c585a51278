//! Server context for the Tether bridge.
//!
//! Provides the [`Server`] that owns the streaming session manager, the
//! reverse-call channel and the cache collaborator, constructed from a
//! validated [`ServerConfig`] with its dispatcher injected up front.
//! Everything here is safe Rust; the C boundary lives in `tether-ffi`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
pub(crate) mod reaper;
pub mod reverse;
pub mod server;
pub mod session;
pub mod streams;
mod sync;

pub use cache::{CacheStore, MemoryCache};
pub use config::{ConfigError, Endpoint, ServerConfig};
pub use reverse::{PendingReply, ReverseCallSink, ReverseChannel};
pub use server::{Server, ServerBuilder, ShutdownReport};
pub use session::{Phase, SessionState};
pub use streams::{StreamManager, StreamSink};
