//! Core types and traits for the Tether native RPC bridge.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! vocabulary shared by the engine and the C ABI layer: session and request
//! identifiers, the error taxonomy, call metadata, the [`Dispatcher`]
//! capability that business logic implements, and the [`StreamIo`] surface
//! streaming handlers are written against.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod dispatch;
pub mod error;
pub mod id;
pub mod metadata;
pub mod router;
pub mod stream;

pub use dispatch::{Dispatcher, Reply};
pub use error::{panic_message, CacheError, DispatchError, ReverseCallError, StreamError};
pub use id::{RequestId, SessionId};
pub use metadata::Metadata;
pub use router::MethodRouter;
pub use stream::{StreamHandler, StreamIo, StreamMsgKind, StreamShape};
