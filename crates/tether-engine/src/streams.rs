//! Streaming session manager.
//!
//! [`StreamManager`] owns the registry of live sessions. Each session runs
//! its [`StreamHandler`] on a dedicated thread (`tether-stream-{id}`) and
//! talks to the front end through a [`StreamSink`].
//!
//! # Locking
//!
//! Each session has two locks: `control` (half-close state, input sender,
//! terminal error) and `outbox` (readiness, buffered deliveries, headers,
//! trailers). They are never held together, and the registry lock is never
//! taken while either is held. Sink deliveries happen with the outbox lock
//! held, which is what makes per-session delivery FIFO.
//!
//! The front end may call [`close`](StreamManager::close) from inside a
//! sink delivery; `close` never touches the outbox. Calling
//! [`send`](StreamManager::send) or [`mark_ready`](StreamManager::mark_ready)
//! for the *same* session from inside its own delivery is not supported.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender};
use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use tether_core::metadata::encode_pairs;
use tether_core::{
    panic_message, SessionId, StreamError, StreamHandler, StreamIo, StreamMsgKind, StreamShape,
};

use crate::session::{Phase, SessionState};
use crate::sync::lock;

/// Receives every delivery bound for the front end.
///
/// Called from arbitrary threads, serially per session.
pub trait StreamSink: Send + Sync {
    /// Deliver one message. Ownership of `payload` passes to the sink.
    fn deliver(&self, session: SessionId, kind: StreamMsgKind, payload: Vec<u8>);
}

impl<F> StreamSink for F
where
    F: Fn(SessionId, StreamMsgKind, Vec<u8>) + Send + Sync,
{
    fn deliver(&self, session: SessionId, kind: StreamMsgKind, payload: Vec<u8>) {
        self(session, kind, payload)
    }
}

// ── Session ────────────────────────────────────────────────────────

struct Control {
    state: SessionState,
    input_tx: Option<Sender<Vec<u8>>>,
    /// Dropped to wake anything blocked on this session.
    done_tx: Option<Sender<()>>,
    last_activity: Instant,
    terminal_error: Option<StreamError>,
    responded: bool,
}

#[derive(Default)]
struct Outbox {
    ready: bool,
    pending: VecDeque<(StreamMsgKind, Vec<u8>)>,
    headers: Vec<(String, String)>,
    headers_sent: bool,
    trailers: Vec<(String, String)>,
}

impl Outbox {
    /// Queue `kind` plus whatever must precede it (headers, trailers).
    fn stage(&mut self, kind: StreamMsgKind, payload: Vec<u8>) {
        if matches!(kind, StreamMsgKind::Data | StreamMsgKind::End) && !self.headers_sent {
            self.headers_sent = true;
            if !self.headers.is_empty() {
                let encoded = encode_pairs(self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                self.pending.push_back((StreamMsgKind::Header, encoded));
            }
        }
        if kind == StreamMsgKind::End && !self.trailers.is_empty() {
            let encoded =
                encode_pairs(self.trailers.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            self.trailers.clear();
            self.pending.push_back((StreamMsgKind::Trailer, encoded));
        }
        self.pending.push_back((kind, payload));
    }

    fn flush(&mut self, id: SessionId, sink: &dyn StreamSink) {
        if !self.ready {
            return;
        }
        while let Some((kind, payload)) = self.pending.pop_front() {
            sink.deliver(id, kind, payload);
        }
    }
}

struct Session {
    id: SessionId,
    shape: StreamShape,
    control: Mutex<Control>,
    outbox: Mutex<Outbox>,
    /// Set once the front end must hear nothing further from this session.
    silenced: AtomicBool,
    input_rx: Receiver<Vec<u8>>,
    done_rx: Receiver<()>,
}

impl Session {
    fn new(id: SessionId, shape: StreamShape, capacity: usize) -> Self {
        let (input_tx, input_rx) = crossbeam_channel::bounded(capacity);
        let (done_tx, done_rx) = crossbeam_channel::bounded(0);
        Self {
            id,
            shape,
            control: Mutex::new(Control {
                state: SessionState::new(shape),
                input_tx: shape.accepts_input().then_some(input_tx),
                done_tx: Some(done_tx),
                last_activity: Instant::now(),
                terminal_error: None,
                responded: false,
            }),
            outbox: Mutex::new(Outbox::default()),
            silenced: AtomicBool::new(false),
            input_rx,
            done_rx,
        }
    }
}

// ── Registry ───────────────────────────────────────────────────────

struct Registry {
    live: IndexMap<SessionId, Arc<Session>>,
    shutting_down: bool,
}

enum Lookup {
    Live(Arc<Session>),
    Closed,
}

struct Shared {
    registry: Mutex<Registry>,
    sink: Arc<dyn StreamSink>,
    input_capacity: usize,
}

impl Shared {
    /// Ids come from a monotonic counter, so an issued id that is no longer
    /// live has been retired for good.
    fn lookup(&self, id: SessionId) -> Result<Lookup, StreamError> {
        let reg = lock(&self.registry);
        if let Some(s) = reg.live.get(&id) {
            Ok(Lookup::Live(Arc::clone(s)))
        } else if id.was_issued() {
            Ok(Lookup::Closed)
        } else {
            Err(StreamError::SessionNotFound { session: id })
        }
    }

    fn retire(&self, s: &Session) {
        let mut reg = lock(&self.registry);
        if reg.live.shift_remove(&s.id).is_some() {
            debug!(session = %s.id, "stream retired");
        }
    }

    /// Retire once both halves are closed and nothing is left to deliver.
    fn maybe_retire(&self, s: &Session) {
        if !lock(&s.control).state.is_terminal() {
            return;
        }
        let drained = s.silenced.load(Ordering::Acquire) || lock(&s.outbox).pending.is_empty();
        if drained {
            self.retire(s);
        }
    }

    /// Stage and, if ready, deliver. No-op once silenced.
    fn push(&self, s: &Session, kind: StreamMsgKind, payload: Vec<u8>) {
        let mut out = lock(&s.outbox);
        if s.silenced.load(Ordering::Acquire) {
            return;
        }
        out.stage(kind, payload);
        out.flush(s.id, self.sink.as_ref());
    }

    fn emit_data(&self, s: &Session, payload: Vec<u8>) -> Result<(), StreamError> {
        {
            let mut c = lock(&s.control);
            if let Some(e) = &c.terminal_error {
                return Err(e.clone());
            }
            if !c.state.output_open() {
                return Err(StreamError::SessionClosed { session: s.id });
            }
            if s.shape == StreamShape::ClientStream {
                if c.responded {
                    return Err(StreamError::ResponseAlreadySent { session: s.id });
                }
                c.responded = true;
            }
            c.last_activity = Instant::now();
        }
        self.push(s, StreamMsgKind::Data, payload);
        Ok(())
    }

    /// Handler-initiated output close: trailers then `End`; input stays open.
    fn close_output(&self, s: &Session) -> Result<(), StreamError> {
        {
            let mut c = lock(&s.control);
            if let Some(e) = &c.terminal_error {
                return Err(e.clone());
            }
            if !c.state.close_output() {
                return Ok(());
            }
            c.last_activity = Instant::now();
        }
        self.push(s, StreamMsgKind::End, Vec::new());
        self.maybe_retire(s);
        Ok(())
    }

    /// The handler returned. Closes both halves and reports the outcome.
    fn finish(&self, s: &Session, outcome: Result<(), StreamError>) {
        let delivery = {
            let mut c = lock(&s.control);
            let output_was_open = c.state.output_open();
            c.state.close_both();
            c.input_tx = None;
            c.done_tx = None;
            c.last_activity = Instant::now();
            if c.terminal_error.is_some() {
                None
            } else {
                match outcome {
                    Ok(()) if output_was_open => Some((StreamMsgKind::End, Vec::new())),
                    Ok(()) => None,
                    Err(e) if output_was_open => {
                        debug!(session = %s.id, error = %e, "stream handler failed");
                        Some((StreamMsgKind::Error, e.to_string().into_bytes()))
                    }
                    Err(e) => {
                        warn!(session = %s.id, error = %e, "stream handler failed after closing output");
                        None
                    }
                }
            }
        };
        if let Some((kind, payload)) = delivery {
            self.push(s, kind, payload);
        }
        self.maybe_retire(s);
    }

    /// Force a session closed with `err`, telling the front end if it is
    /// still owed output. Delivery bypasses readiness.
    fn fail(&self, s: &Session, err: StreamError) -> bool {
        let output_was_open = {
            let mut c = lock(&s.control);
            if c.terminal_error.is_some() {
                return false;
            }
            c.terminal_error = Some(err.clone());
            let open = c.state.output_open();
            c.state.close_both();
            c.input_tx = None;
            c.done_tx = None;
            open
        };
        {
            let mut out = lock(&s.outbox);
            let owed = output_was_open || !out.pending.is_empty();
            out.pending.clear();
            if owed && !s.silenced.load(Ordering::Acquire) {
                self.sink
                    .deliver(s.id, StreamMsgKind::Error, err.to_string().into_bytes());
            }
            s.silenced.store(true, Ordering::Release);
        }
        self.retire(s);
        true
    }
}

// ── Handler view ───────────────────────────────────────────────────

struct SessionIo {
    session: Arc<Session>,
    shared: Arc<Shared>,
}

impl StreamIo for SessionIo {
    fn session_id(&self) -> SessionId {
        self.session.id
    }

    fn shape(&self) -> StreamShape {
        self.session.shape
    }

    fn recv(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        let s = &self.session;
        let msg = select! {
            recv(s.input_rx) -> msg => msg.ok(),
            recv(s.done_rx) -> _ => None,
        };
        if msg.is_none() {
            if let Some(e) = lock(&s.control).terminal_error.clone() {
                return Err(e);
            }
        }
        Ok(msg)
    }

    fn send(&mut self, payload: Vec<u8>) -> Result<(), StreamError> {
        self.shared.emit_data(&self.session, payload)
    }

    fn close_send(&mut self) -> Result<(), StreamError> {
        self.shared.close_output(&self.session)
    }

    fn set_header(&mut self, key: &str, value: &str) {
        let mut out = lock(&self.session.outbox);
        if out.headers_sent {
            debug!(session = %self.session.id, key, "header set after headers were sent; ignored");
            return;
        }
        out.headers.push((key.to_string(), value.to_string()));
    }

    fn set_trailer(&mut self, key: &str, value: &str) {
        lock(&self.session.outbox)
            .trailers
            .push((key.to_string(), value.to_string()));
    }
}

// ── StreamManager ──────────────────────────────────────────────────

/// Registry and lifecycle driver for streaming sessions.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct StreamManager {
    shared: Arc<Shared>,
}

impl StreamManager {
    /// Create a manager delivering to `sink`.
    ///
    /// `input_capacity` bounds each session's input queue; a full queue
    /// blocks the front end's send.
    pub fn new(sink: Arc<dyn StreamSink>, input_capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry {
                    live: IndexMap::new(),
                    shutting_down: false,
                }),
                sink,
                input_capacity: input_capacity.max(1),
            }),
        }
    }

    /// Register a session and start its handler. Returns immediately.
    pub fn open(&self, shape: StreamShape, handler: StreamHandler) -> Result<SessionId, StreamError> {
        let id = SessionId::next();
        let session = Arc::new(Session::new(id, shape, self.shared.input_capacity));
        {
            let mut reg = lock(&self.shared.registry);
            if reg.shutting_down {
                return Err(StreamError::ShuttingDown);
            }
            reg.live.insert(id, Arc::clone(&session));
        }

        let mut io = SessionIo {
            session: Arc::clone(&session),
            shared: Arc::clone(&self.shared),
        };
        let spawned = thread::Builder::new()
            .name(format!("tether-stream-{id}"))
            .spawn(move || {
                let outcome = match catch_unwind(AssertUnwindSafe(|| handler(&mut io))) {
                    Ok(r) => r,
                    Err(payload) => {
                        let msg = panic_message(payload.as_ref());
                        error!(session = %io.session.id, panic = %msg, "stream handler panicked");
                        Err(StreamError::failed(format!("handler panicked: {msg}")))
                    }
                };
                io.shared.finish(&io.session, outcome);
            });

        match spawned {
            Ok(_) => {
                debug!(session = %id, shape = %shape, "stream opened");
                Ok(id)
            }
            Err(e) => {
                lock(&self.shared.registry).live.shift_remove(&id);
                Err(StreamError::failed(format!("thread spawn failed: {e}")))
            }
        }
    }

    /// Push one input chunk from the front end.
    ///
    /// Blocks while the session's input queue is full.
    pub fn send(&self, id: SessionId, payload: Vec<u8>) -> Result<(), StreamError> {
        let session = match self.shared.lookup(id)? {
            Lookup::Live(s) => s,
            Lookup::Closed => {
                debug!(session = %id, "send on closed stream rejected");
                return Err(StreamError::InputClosed { session: id });
            }
        };
        let tx = {
            let mut c = lock(&session.control);
            if !session.shape.accepts_input() {
                return Err(StreamError::WrongShape { session: id });
            }
            let Some(tx) = c.input_tx.clone() else {
                debug!(session = %id, "send after input close rejected");
                return Err(StreamError::InputClosed { session: id });
            };
            c.last_activity = Instant::now();
            tx
        };
        select! {
            send(tx, payload) -> r => r.map_err(|_| StreamError::InputClosed { session: id }),
            recv(session.done_rx) -> _ => Err(lock(&session.control)
                .terminal_error
                .clone()
                .unwrap_or(StreamError::InputClosed { session: id })),
        }
    }

    /// Close the input half. Idempotent.
    pub fn close_input(&self, id: SessionId) -> Result<(), StreamError> {
        let session = match self.shared.lookup(id)? {
            Lookup::Live(s) => s,
            Lookup::Closed => return Ok(()),
        };
        {
            let mut c = lock(&session.control);
            if c.state.close_input() {
                c.input_tx = None;
                c.last_activity = Instant::now();
                debug!(session = %id, "stream input closed");
            }
        }
        self.shared.maybe_retire(&session);
        Ok(())
    }

    /// Cancel a session from the front end. Idempotent; nothing further is
    /// delivered for it.
    pub fn close(&self, id: SessionId) -> Result<(), StreamError> {
        let session = match self.shared.lookup(id)? {
            Lookup::Live(s) => s,
            Lookup::Closed => return Ok(()),
        };
        {
            let mut c = lock(&session.control);
            if c.terminal_error.is_none() {
                c.terminal_error = Some(StreamError::SessionClosed { session: id });
            }
            c.state.close_both();
            c.input_tx = None;
            c.done_tx = None;
        }
        session.silenced.store(true, Ordering::Release);
        self.shared.retire(&session);
        debug!(session = %id, "stream closed by front end");
        Ok(())
    }

    /// The front end is ready to receive deliveries for `id`; flush anything
    /// buffered so far.
    pub fn mark_ready(&self, id: SessionId) -> Result<(), StreamError> {
        let session = match self.shared.lookup(id)? {
            Lookup::Live(s) => s,
            Lookup::Closed => return Ok(()),
        };
        {
            let mut c = lock(&session.control);
            c.state.mark_ready();
            c.last_activity = Instant::now();
        }
        {
            let mut out = lock(&session.outbox);
            out.ready = true;
            if !session.silenced.load(Ordering::Acquire) {
                out.flush(id, self.shared.sink.as_ref());
            }
        }
        self.shared.maybe_retire(&session);
        Ok(())
    }

    /// Force-close every session idle for at least `timeout` as of `now`.
    /// Returns how many were expired.
    pub fn expire_idle(&self, now: Instant, timeout: Duration) -> usize {
        let sessions: Vec<Arc<Session>> = lock(&self.shared.registry).live.values().cloned().collect();
        let mut expired = 0;
        for s in sessions {
            let idle = now.saturating_duration_since(lock(&s.control).last_activity);
            if idle < timeout {
                continue;
            }
            if self.shared.fail(&s, StreamError::Timeout { session: s.id }) {
                info!(session = %s.id, idle_ms = idle.as_millis() as u64, "stream timed out");
                expired += 1;
            }
        }
        expired
    }

    /// Refuse new sessions and fail every live one with `ShuttingDown`.
    /// Returns how many were closed.
    pub fn shutdown(&self) -> usize {
        let sessions: Vec<Arc<Session>> = {
            let mut reg = lock(&self.shared.registry);
            reg.shutting_down = true;
            reg.live.values().cloned().collect()
        };
        sessions
            .iter()
            .filter(|s| self.shared.fail(s, StreamError::ShuttingDown))
            .count()
    }

    /// Phase of a live session, or `None` if it is not live.
    pub fn phase(&self, id: SessionId) -> Option<Phase> {
        let session = lock(&self.shared.registry).live.get(&id).cloned()?;
        let phase = lock(&session.control).state.phase();
        Some(phase)
    }

    /// Number of live sessions.
    pub fn live_count(&self) -> usize {
        lock(&self.shared.registry).live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Receiver};

    type Delivery = (SessionId, StreamMsgKind, Vec<u8>);

    fn manager() -> (StreamManager, Receiver<Delivery>) {
        let (tx, rx) = unbounded();
        let sink = move |id: SessionId, kind: StreamMsgKind, payload: Vec<u8>| {
            let _ = tx.send((id, kind, payload));
        };
        (StreamManager::new(Arc::new(sink), 4), rx)
    }

    fn drain(io: &mut dyn StreamIo) -> Result<(), StreamError> {
        while io.recv()?.is_some() {}
        Ok(())
    }

    fn next(rx: &Receiver<Delivery>) -> Delivery {
        rx.recv_timeout(Duration::from_secs(5)).expect("delivery")
    }

    fn wait_retired(m: &StreamManager, id: SessionId) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while m.phase(id).is_some() {
            assert!(Instant::now() < deadline, "session {id} never retired");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn server_stream_buffers_until_ready() {
        let (m, rx) = manager();
        let id = m
            .open(
                StreamShape::ServerStream,
                Box::new(|io| {
                    io.send(b"a".to_vec())?;
                    io.send(b"b".to_vec())
                }),
            )
            .unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(rx.try_recv().is_err());
        m.mark_ready(id).unwrap();
        assert_eq!(next(&rx), (id, StreamMsgKind::Data, b"a".to_vec()));
        assert_eq!(next(&rx), (id, StreamMsgKind::Data, b"b".to_vec()));
        assert_eq!(next(&rx).1, StreamMsgKind::End);
        wait_retired(&m, id);
    }

    #[test]
    fn headers_precede_data_and_trailers_precede_end() {
        let (m, rx) = manager();
        let id = m
            .open(
                StreamShape::ServerStream,
                Box::new(|io| {
                    io.set_header("content-type", "application/grpc");
                    io.set_trailer("grpc-status", "0");
                    io.send(b"x".to_vec())
                }),
            )
            .unwrap();
        m.mark_ready(id).unwrap();
        assert_eq!(
            next(&rx),
            (id, StreamMsgKind::Header, b"content-type=application/grpc\n".to_vec())
        );
        assert_eq!(next(&rx).1, StreamMsgKind::Data);
        assert_eq!(next(&rx), (id, StreamMsgKind::Trailer, b"grpc-status=0\n".to_vec()));
        assert_eq!(next(&rx).1, StreamMsgKind::End);
    }

    #[test]
    fn send_to_server_stream_is_wrong_shape() {
        let (m, _rx) = manager();
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let id = m
            .open(
                StreamShape::ServerStream,
                Box::new(move |_| {
                    let _ = gate_rx.recv();
                    Ok(())
                }),
            )
            .unwrap();
        assert_eq!(
            m.send(id, vec![1]),
            Err(StreamError::WrongShape { session: id })
        );
        drop(gate_tx);
    }

    #[test]
    fn unknown_and_closed_ids_differ() {
        let (m, _rx) = manager();
        let never = SessionId(i64::MAX);
        assert_eq!(
            m.send(never, vec![]),
            Err(StreamError::SessionNotFound { session: never })
        );
        assert_eq!(
            m.close(never),
            Err(StreamError::SessionNotFound { session: never })
        );

        let id = m
            .open(StreamShape::Bidi, Box::new(drain))
            .unwrap();
        m.close(id).unwrap();
        assert_eq!(m.close(id), Ok(()));
        assert_eq!(m.close_input(id), Ok(()));
        assert_eq!(
            m.send(id, vec![1]),
            Err(StreamError::InputClosed { session: id })
        );
    }

    #[test]
    fn close_wakes_blocked_handler_with_session_closed() {
        let (m, rx) = manager();
        let (seen_tx, seen_rx) = crossbeam_channel::bounded(1);
        let id = m
            .open(
                StreamShape::Bidi,
                Box::new(move |io| {
                    let r = io.recv();
                    let _ = seen_tx.send(r.clone());
                    r.map(|_| ())
                }),
            )
            .unwrap();
        m.mark_ready(id).unwrap();
        m.close(id).unwrap();
        let r = seen_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(r, Err(StreamError::SessionClosed { session: id }));
        thread::sleep(Duration::from_millis(20));
        assert!(rx.try_recv().is_err(), "closed session must stay silent");
    }

    #[test]
    fn expire_idle_delivers_timeout_and_wakes_handler() {
        let (m, rx) = manager();
        let (seen_tx, seen_rx) = crossbeam_channel::bounded(1);
        let id = m
            .open(
                StreamShape::ClientStream,
                Box::new(move |io| {
                    let r = io.recv();
                    let _ = seen_tx.send(r.clone());
                    r.map(|_| ())
                }),
            )
            .unwrap();
        assert_eq!(m.expire_idle(Instant::now(), Duration::from_secs(60)), 0);
        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(m.expire_idle(later, Duration::from_secs(60)), 1);
        let (sid, kind, payload) = next(&rx);
        assert_eq!((sid, kind), (id, StreamMsgKind::Error));
        assert_eq!(String::from_utf8(payload).unwrap(), format!("stream {id} timed out"));
        assert_eq!(
            seen_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Err(StreamError::Timeout { session: id })
        );
        assert_eq!(m.phase(id), None);
        assert_eq!(m.close(id), Ok(()));
    }

    #[test]
    fn client_stream_rejects_second_response() {
        let (m, rx) = manager();
        let id = m
            .open(
                StreamShape::ClientStream,
                Box::new(|io| {
                    io.send(b"one".to_vec())?;
                    match io.send(b"two".to_vec()) {
                        Err(StreamError::ResponseAlreadySent { .. }) => Ok(()),
                        other => Err(StreamError::failed(format!("unexpected {other:?}"))),
                    }
                }),
            )
            .unwrap();
        m.mark_ready(id).unwrap();
        assert_eq!(next(&rx).2, b"one".to_vec());
        assert_eq!(next(&rx).1, StreamMsgKind::End);
    }

    #[test]
    fn handler_error_and_panic_become_error_deliveries() {
        let (m, rx) = manager();
        let failing = m
            .open(StreamShape::ServerStream, Box::new(|_| Err(StreamError::failed("nope"))))
            .unwrap();
        m.mark_ready(failing).unwrap();
        let (_, kind, payload) = next(&rx);
        assert_eq!(kind, StreamMsgKind::Error);
        assert_eq!(payload, b"stream handler failed: nope".to_vec());

        let panicking = m
            .open(StreamShape::ServerStream, Box::new(|_| panic!("kaboom")))
            .unwrap();
        m.mark_ready(panicking).unwrap();
        let (sid, kind, payload) = next(&rx);
        assert_eq!((sid, kind), (panicking, StreamMsgKind::Error));
        assert!(String::from_utf8(payload).unwrap().contains("kaboom"));
    }

    #[test]
    fn shutdown_fails_live_sessions_and_refuses_new_ones() {
        let (m, rx) = manager();
        let id = m
            .open(StreamShape::Bidi, Box::new(drain))
            .unwrap();
        assert_eq!(m.shutdown(), 1);
        assert_eq!(next(&rx), (id, StreamMsgKind::Error, b"server is shutting down".to_vec()));
        assert!(matches!(
            m.open(StreamShape::Bidi, Box::new(|_| Ok(()))),
            Err(StreamError::ShuttingDown)
        ));
        assert_eq!(m.live_count(), 0);
    }

    #[test]
    fn long_retired_ids_stay_closed() {
        let (m, _rx) = manager();
        let first = m
            .open(StreamShape::Bidi, Box::new(drain))
            .unwrap();
        m.close(first).unwrap();
        for _ in 0..1100 {
            let id = m
                .open(StreamShape::Bidi, Box::new(|_| Ok(())))
                .unwrap();
            m.close(id).unwrap();
        }
        assert_eq!(m.close(first), Ok(()));
        assert_eq!(m.close_input(first), Ok(()));
        assert_eq!(
            m.send(first, vec![1]),
            Err(StreamError::InputClosed { session: first })
        );
        assert_eq!(m.live_count(), 0);
    }
}
