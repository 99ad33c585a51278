//! [`MethodRouter`]: a table-driven [`Dispatcher`] keyed by method path.
//!
//! Handlers are registered by method path and shape. Registration order is
//! preserved so [`MethodRouter::methods`] lists routes deterministically.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, StreamError};
use crate::metadata::Metadata;
use crate::stream::{StreamHandler, StreamIo, StreamShape};

type UnaryFn = dyn Fn(&[u8], &Metadata) -> Result<Vec<u8>, DispatchError> + Send + Sync;
type ServerStreamFn = dyn Fn(&[u8], &mut dyn StreamIo) -> Result<(), StreamError> + Send + Sync;
type InputStreamFn = dyn Fn(&mut dyn StreamIo) -> Result<(), StreamError> + Send + Sync;

enum Route {
    Unary(Arc<UnaryFn>),
    ServerStream(Arc<ServerStreamFn>),
    ClientStream(Arc<InputStreamFn>),
    Bidi(Arc<InputStreamFn>),
}

impl Route {
    fn shape(&self) -> Option<StreamShape> {
        match self {
            Self::Unary(_) => None,
            Self::ServerStream(_) => Some(StreamShape::ServerStream),
            Self::ClientStream(_) => Some(StreamShape::ClientStream),
            Self::Bidi(_) => Some(StreamShape::Bidi),
        }
    }
}

/// A [`Dispatcher`] built from per-method closures.
///
/// Registering the same path twice replaces the earlier handler but keeps
/// its position in [`methods`](MethodRouter::methods).
#[derive(Default)]
pub struct MethodRouter {
    routes: IndexMap<String, Route>,
}

impl MethodRouter {
    /// An empty router: every call fails with `MethodNotFound`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unary handler.
    pub fn unary<F>(mut self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[u8], &Metadata) -> Result<Vec<u8>, DispatchError> + Send + Sync + 'static,
    {
        self.routes.insert(method.into(), Route::Unary(Arc::new(f)));
        self
    }

    /// Register a server-streaming handler. It receives the initial request.
    pub fn server_stream<F>(mut self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[u8], &mut dyn StreamIo) -> Result<(), StreamError> + Send + Sync + 'static,
    {
        self.routes
            .insert(method.into(), Route::ServerStream(Arc::new(f)));
        self
    }

    /// Register a client-streaming handler.
    pub fn client_stream<F>(mut self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut dyn StreamIo) -> Result<(), StreamError> + Send + Sync + 'static,
    {
        self.routes
            .insert(method.into(), Route::ClientStream(Arc::new(f)));
        self
    }

    /// Register a bidirectional handler.
    pub fn bidi<F>(mut self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut dyn StreamIo) -> Result<(), StreamError> + Send + Sync + 'static,
    {
        self.routes.insert(method.into(), Route::Bidi(Arc::new(f)));
        self
    }

    /// Registered method paths, in registration order.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True if no methods are registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn lookup(&self, method: &str) -> Result<&Route, DispatchError> {
        self.routes
            .get(method)
            .ok_or_else(|| DispatchError::MethodNotFound {
                method: method.to_string(),
            })
    }
}

impl Dispatcher for MethodRouter {
    fn invoke(
        &self,
        method: &str,
        payload: &[u8],
        metadata: &Metadata,
    ) -> Result<Vec<u8>, DispatchError> {
        match self.lookup(method)? {
            Route::Unary(f) => f(payload, metadata),
            _ => Err(DispatchError::WrongShape {
                method: method.to_string(),
            }),
        }
    }

    fn open_stream(
        &self,
        shape: StreamShape,
        method: &str,
        payload: &[u8],
    ) -> Result<StreamHandler, DispatchError> {
        let route = self.lookup(method)?;
        if route.shape() != Some(shape) {
            return Err(DispatchError::WrongShape {
                method: method.to_string(),
            });
        }
        let handler: StreamHandler = match route {
            Route::ServerStream(f) => {
                let f = Arc::clone(f);
                let request = payload.to_vec();
                Box::new(move |io: &mut dyn StreamIo| f(&request, io))
            }
            Route::ClientStream(f) | Route::Bidi(f) => {
                let f = Arc::clone(f);
                Box::new(move |io: &mut dyn StreamIo| f(io))
            }
            Route::Unary(_) => unreachable!("unary routes have no stream shape"),
        };
        Ok(handler)
    }
}
