//! The [`Server`] context object.
//!
//! A server is built once from a validated [`ServerConfig`] and an injected
//! [`Dispatcher`], then shared by every entry point. It owns the streaming
//! session manager (plus its reaper thread when an idle timeout is set),
//! the reverse-call table, and the cache collaborator when the cache is
//! enabled. Dropping the server shuts it down.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, trace};

use tether_core::{
    panic_message, CacheError, DispatchError, Dispatcher, Metadata, Reply, RequestId,
    ReverseCallError, SessionId, StreamError, StreamMsgKind, StreamShape,
};

use crate::cache::{CacheStore, MemoryCache};
use crate::config::{ConfigError, ServerConfig};
use crate::reaper::Reaper;
use crate::reverse::{PendingReply, ReverseCallSink, ReverseChannel};
use crate::streams::{StreamManager, StreamSink};
use crate::sync::lock;

// ── ShutdownReport ─────────────────────────────────────────────────

/// What [`Server::shutdown`] tore down.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Live sessions failed with `ShuttingDown`.
    pub sessions_closed: usize,
    /// Pending reverse calls failed with `Cancelled`.
    pub pending_calls_cancelled: usize,
    /// Whether a reaper thread was running and joined cleanly.
    pub reaper_joined: bool,
}

// ── Default collaborators ──────────────────────────────────────────

struct DiscardStreams;

impl StreamSink for DiscardStreams {
    fn deliver(&self, session: SessionId, kind: StreamMsgKind, _payload: Vec<u8>) {
        trace!(session = %session, kind = ?kind, "no stream sink; delivery dropped");
    }
}

struct NoFrontEnd;

impl ReverseCallSink for NoFrontEnd {
    fn call(&self, _: RequestId, _: &str, _: &[u8]) -> Result<(), ReverseCallError> {
        Err(ReverseCallError::NoCallback)
    }
}

// ── ServerBuilder ──────────────────────────────────────────────────

/// Collects a server's collaborators before [`start`](ServerBuilder::start).
pub struct ServerBuilder {
    config: ServerConfig,
    dispatcher: Arc<dyn Dispatcher>,
    stream_sink: Option<Arc<dyn StreamSink>>,
    reverse_sink: Option<Arc<dyn ReverseCallSink>>,
    cache_store: Option<Arc<dyn CacheStore>>,
}

impl ServerBuilder {
    /// Where stream deliveries go. Default: dropped.
    pub fn stream_sink(mut self, sink: Arc<dyn StreamSink>) -> Self {
        self.stream_sink = Some(sink);
        self
    }

    /// How reverse calls reach the front end. Default: every call fails
    /// with `NoCallback`.
    pub fn reverse_sink(mut self, sink: Arc<dyn ReverseCallSink>) -> Self {
        self.reverse_sink = Some(sink);
        self
    }

    /// Cache backend used when the cache is enabled. Default: [`MemoryCache`].
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// Validate the configuration and start background threads.
    pub fn start(self) -> Result<Server, ConfigError> {
        let config = self.config;
        config.validate()?;

        let streams = StreamManager::new(
            self.stream_sink.unwrap_or_else(|| Arc::new(DiscardStreams)),
            config.input_queue_capacity,
        );
        let reverse = ReverseChannel::new(
            self.reverse_sink.unwrap_or_else(|| Arc::new(NoFrontEnd)),
            config.reverse_call_timeout,
        );
        let cache = if config.cache_active() {
            Some(
                self.cache_store
                    .unwrap_or_else(|| Arc::new(MemoryCache::new())),
            )
        } else {
            None
        };
        let reaper = match config.stream_timeout {
            Some(timeout) => Some(Reaper::spawn(
                streams.clone(),
                timeout,
                config.reaper_interval,
            )?),
            None => None,
        };

        info!(
            cache = cache.is_some(),
            stream_timeout_ms = config.stream_timeout.map(|t| t.as_millis() as u64),
            "server started"
        );
        Ok(Server {
            config,
            dispatcher: self.dispatcher,
            streams,
            reverse,
            cache,
            reaper: Mutex::new(reaper),
            stopped: AtomicBool::new(false),
        })
    }
}

// ── Server ─────────────────────────────────────────────────────────

/// A running bridge server.
pub struct Server {
    config: ServerConfig,
    dispatcher: Arc<dyn Dispatcher>,
    streams: StreamManager,
    reverse: ReverseChannel,
    cache: Option<Arc<dyn CacheStore>>,
    reaper: Mutex<Option<Reaper>>,
    stopped: AtomicBool,
}

impl Server {
    /// Start building a server around `dispatcher`.
    pub fn builder(config: ServerConfig, dispatcher: Arc<dyn Dispatcher>) -> ServerBuilder {
        ServerBuilder {
            config,
            dispatcher,
            stream_sink: None,
            reverse_sink: None,
            cache_store: None,
        }
    }

    /// The configuration the server was started with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    // ── Unary ──────────────────────────────────────────────────────

    /// Run a unary call with no metadata.
    pub fn invoke_unary(&self, method: &str, payload: &[u8]) -> Reply {
        self.invoke_unary_with_metadata(method, payload, &Metadata::new())
    }

    /// Run a unary call. Blocks until the dispatcher returns. A panic in
    /// the dispatcher becomes [`DispatchError::Panicked`].
    pub fn invoke_unary_with_metadata(&self, method: &str, payload: &[u8], metadata: &Metadata) -> Reply {
        if self.is_stopped() {
            return Reply::Failed(DispatchError::Unavailable);
        }
        match catch_unwind(AssertUnwindSafe(|| {
            self.dispatcher.invoke(method, payload, metadata)
        })) {
            Ok(result) => {
                if let Err(e) = &result {
                    debug!(method, error = %e, "unary call failed");
                }
                Reply::from(result)
            }
            Err(p) => {
                let message = panic_message(p.as_ref());
                error!(method, panic = %message, "dispatcher panicked");
                Reply::Failed(DispatchError::Panicked { message })
            }
        }
    }

    // ── Streaming ──────────────────────────────────────────────────

    /// Open a session of `shape` on `method`. Returns as soon as the
    /// session id is issued.
    pub fn start_stream(&self, shape: StreamShape, method: &str, payload: &[u8]) -> Result<SessionId, StreamError> {
        if self.is_stopped() {
            return Err(StreamError::ShuttingDown);
        }
        let handler = match catch_unwind(AssertUnwindSafe(|| {
            self.dispatcher.open_stream(shape, method, payload)
        })) {
            Ok(r) => r?,
            Err(p) => {
                let message = panic_message(p.as_ref());
                error!(method, panic = %message, "dispatcher panicked opening stream");
                return Err(StreamError::OpenFailed(DispatchError::Panicked { message }));
            }
        };
        self.streams.open(shape, handler)
    }

    /// Open a server-streaming session with its single request.
    pub fn start_server_stream(&self, method: &str, payload: &[u8]) -> Result<SessionId, StreamError> {
        self.start_stream(StreamShape::ServerStream, method, payload)
    }

    /// Open a client-streaming session.
    pub fn start_client_stream(&self, method: &str) -> Result<SessionId, StreamError> {
        self.start_stream(StreamShape::ClientStream, method, &[])
    }

    /// Open a bidirectional session.
    pub fn start_bidi_stream(&self, method: &str) -> Result<SessionId, StreamError> {
        self.start_stream(StreamShape::Bidi, method, &[])
    }

    /// Push one input chunk into a session.
    pub fn send_stream_data(&self, id: SessionId, payload: Vec<u8>) -> Result<(), StreamError> {
        self.streams.send(id, payload)
    }

    /// Cancel a session. Idempotent.
    pub fn close_stream(&self, id: SessionId) -> Result<(), StreamError> {
        self.streams.close(id)
    }

    /// Close a session's input half. Idempotent.
    pub fn close_stream_input(&self, id: SessionId) -> Result<(), StreamError> {
        self.streams.close_input(id)
    }

    /// The front end is ready for deliveries on `id`.
    pub fn stream_ready(&self, id: SessionId) -> Result<(), StreamError> {
        self.streams.mark_ready(id)
    }

    /// The session manager, for inspection.
    pub fn streams(&self) -> &StreamManager {
        &self.streams
    }

    // ── Reverse calls ──────────────────────────────────────────────

    /// Call into the front end and wait for its answer.
    pub fn call_front_end(&self, method: &str, payload: &[u8]) -> Result<Vec<u8>, ReverseCallError> {
        self.reverse.call(method, payload)
    }

    /// Call into the front end without waiting.
    pub fn begin_front_end_call(&self, method: &str, payload: &[u8]) -> Result<PendingReply<'_>, ReverseCallError> {
        self.reverse.begin(method, payload)
    }

    /// Deliver the front end's answer to a reverse call.
    pub fn deliver_reverse_response(&self, id: RequestId, payload: Vec<u8>) -> Result<(), ReverseCallError> {
        self.reverse.complete(id, payload)
    }

    /// Fail every pending reverse call with `Cancelled`.
    pub fn cancel_reverse_calls(&self) -> usize {
        self.reverse.cancel_all()
    }

    /// The reverse-call table, for inspection.
    pub fn reverse(&self) -> &ReverseChannel {
        &self.reverse
    }

    // ── Cache ──────────────────────────────────────────────────────

    /// The cache collaborator, or [`CacheError::Disabled`].
    pub fn cache(&self) -> Result<&dyn CacheStore, CacheError> {
        self.cache.as_deref().ok_or(CacheError::Disabled)
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Stop the reaper, fail live sessions, and cancel pending reverse
    /// calls. Idempotent: later calls return an empty report.
    pub fn shutdown(&self) -> ShutdownReport {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return ShutdownReport::default();
        }
        let reaper_joined = lock(&self.reaper).take().is_some_and(|mut r| r.stop());
        let report = ShutdownReport {
            sessions_closed: self.streams.shutdown(),
            pending_calls_cancelled: self.reverse.cancel_all(),
            reaper_joined,
        };
        info!(
            sessions_closed = report.sessions_closed,
            pending_calls_cancelled = report.pending_calls_cancelled,
            "server stopped"
        );
        report
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tether_core::MethodRouter;

    fn router() -> Arc<dyn Dispatcher> {
        Arc::new(
            MethodRouter::new()
                .unary("ping", |_, _| Ok(b"pong".to_vec()))
                .unary("empty", |_, _| Ok(Vec::new()))
                .unary("deadline", |_, meta| {
                    Ok(meta
                        .timeout()
                        .map(|t| t.as_millis().to_string().into_bytes())
                        .unwrap_or_default())
                })
                .unary("boom", |_, _| panic!("handler blew up")),
        )
    }

    fn server() -> Server {
        Server::builder(ServerConfig::default(), router()).start().unwrap()
    }

    #[test]
    fn unary_reply_is_tri_state() {
        let s = server();
        assert_eq!(s.invoke_unary("ping", &[]), Reply::Payload(b"pong".to_vec()));
        assert_eq!(s.invoke_unary("empty", &[]), Reply::Empty);
        assert!(matches!(
            s.invoke_unary("nope", &[]),
            Reply::Failed(DispatchError::MethodNotFound { .. })
        ));
    }

    #[test]
    fn metadata_reaches_dispatcher() {
        let s = server();
        let meta = Metadata::parse(b"__timeout_ms=750\n");
        assert_eq!(
            s.invoke_unary_with_metadata("deadline", &[], &meta),
            Reply::Payload(b"750".to_vec())
        );
    }

    #[test]
    fn dispatcher_panic_is_contained() {
        let s = server();
        match s.invoke_unary("boom", &[]) {
            Reply::Failed(DispatchError::Panicked { message }) => {
                assert_eq!(message, "handler blew up");
            }
            other => panic!("expected Panicked, got {other:?}"),
        }
        assert_eq!(s.invoke_unary("ping", &[]), Reply::Payload(b"pong".to_vec()));
    }

    #[test]
    fn unknown_stream_method_fails_to_open() {
        let s = server();
        assert!(matches!(
            s.start_bidi_stream("/svc.X/Y"),
            Err(StreamError::OpenFailed(DispatchError::MethodNotFound { .. }))
        ));
    }

    #[test]
    fn cache_disabled_unless_configured() {
        let s = server();
        assert!(matches!(s.cache(), Err(CacheError::Disabled)));

        let cfg = ServerConfig {
            enable_cache: true,
            cache_path: Some(PathBuf::from("/tmp/tether-cache")),
            ..ServerConfig::default()
        };
        let s = Server::builder(cfg, router()).start().unwrap();
        let cache = s.cache().unwrap();
        cache.put("s", "k", vec![1], 0).unwrap();
        assert_eq!(cache.get("s", "k").unwrap(), Some(vec![1]));
    }

    #[test]
    fn invalid_config_refuses_to_start() {
        let cfg = ServerConfig {
            input_queue_capacity: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(
            Server::builder(cfg, router()).start(),
            Err(ConfigError::InputQueueZero)
        ));
    }

    #[test]
    fn reverse_call_without_front_end_fails_fast() {
        let s = server();
        assert_eq!(s.call_front_end("m", &[]), Err(ReverseCallError::NoCallback));
    }

    #[test]
    fn shutdown_is_idempotent_and_stops_service() {
        let s = Server::builder(
            ServerConfig::default().with_stream_timeout_ms(1_000),
            router(),
        )
        .start()
        .unwrap();
        let first = s.shutdown();
        assert!(first.reaper_joined);
        assert_eq!(s.shutdown(), ShutdownReport::default());
        assert_eq!(
            s.invoke_unary("ping", &[]),
            Reply::Failed(DispatchError::Unavailable)
        );
        assert!(matches!(
            s.start_client_stream("x"),
            Err(StreamError::ShuttingDown)
        ));
    }
}
