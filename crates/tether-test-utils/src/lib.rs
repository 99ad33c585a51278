//! Test utilities and mock collaborators for Tether development.
//!
//! Provides a scripted dispatcher ([`fixtures::scripted_router`]), a
//! [`RecordingStreamSink`] that captures stream deliveries in order, and a
//! [`RecordingReverseSink`] standing in for the front end's reverse-call
//! callback.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use tether_core::{RequestId, ReverseCallError, SessionId, StreamMsgKind};
use tether_engine::{ReverseCallSink, Server, ServerConfig, StreamSink};

/// One stream delivery as seen by the front end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub session: SessionId,
    pub kind: StreamMsgKind,
    pub payload: Vec<u8>,
}

/// [`StreamSink`] that records every delivery in arrival order.
#[derive(Default)]
pub struct RecordingStreamSink {
    log: Mutex<Vec<Delivery>>,
    arrived: Condvar,
}

impl RecordingStreamSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliveries for `session`, in order.
    pub fn deliveries_for(&self, session: SessionId) -> Vec<Delivery> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.session == session)
            .cloned()
            .collect()
    }

    /// Every delivery so far, in order.
    pub fn all(&self) -> Vec<Delivery> {
        self.log.lock().unwrap().clone()
    }

    /// Block until `session` has received `End` or `Error`, then return its
    /// deliveries. Panics after `timeout`.
    pub fn wait_terminal(&self, session: SessionId, timeout: Duration) -> Vec<Delivery> {
        self.wait_until(timeout, |log| {
            log.iter()
                .any(|d| d.session == session && d.kind.is_terminal())
        });
        self.deliveries_for(session)
    }

    /// Block until at least `n` deliveries have arrived for `session`.
    pub fn wait_count(&self, session: SessionId, n: usize, timeout: Duration) -> Vec<Delivery> {
        self.wait_until(timeout, |log| {
            log.iter().filter(|d| d.session == session).count() >= n
        });
        self.deliveries_for(session)
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&[Delivery]) -> bool) {
        let deadline = Instant::now() + timeout;
        let mut log = self.log.lock().unwrap();
        while !done(&log) {
            let left = deadline
                .checked_duration_since(Instant::now())
                .unwrap_or_else(|| panic!("timed out waiting for deliveries; have {log:?}"));
            log = self.arrived.wait_timeout(log, left).unwrap().0;
        }
    }
}

impl StreamSink for RecordingStreamSink {
    fn deliver(&self, session: SessionId, kind: StreamMsgKind, payload: Vec<u8>) {
        self.log.lock().unwrap().push(Delivery {
            session,
            kind,
            payload,
        });
        self.arrived.notify_all();
    }
}

/// A reverse call as received by the front end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReverseRequest {
    pub id: RequestId,
    pub method: String,
    pub payload: Vec<u8>,
}

/// [`ReverseCallSink`] that queues every request for the test to answer.
pub struct RecordingReverseSink {
    tx: Sender<ReverseRequest>,
    rx: Receiver<ReverseRequest>,
}

impl RecordingReverseSink {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        Arc::new(Self { tx, rx })
    }

    /// Next request, waiting up to `timeout`.
    pub fn next_request(&self, timeout: Duration) -> Option<ReverseRequest> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// A receiver over all future requests.
    pub fn requests(&self) -> Receiver<ReverseRequest> {
        self.rx.clone()
    }
}

impl ReverseCallSink for RecordingReverseSink {
    fn call(&self, request: RequestId, method: &str, payload: &[u8]) -> Result<(), ReverseCallError> {
        let _ = self.tx.send(ReverseRequest {
            id: request,
            method: method.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

/// Answer `count` reverse calls from a separate thread, computing each
/// answer with `answer`.
pub fn spawn_responder<F>(
    server: Arc<Server>,
    requests: Receiver<ReverseRequest>,
    count: usize,
    answer: F,
) -> JoinHandle<()>
where
    F: Fn(&ReverseRequest) -> Vec<u8> + Send + 'static,
{
    thread::spawn(move || {
        for req in requests.iter().take(count) {
            server
                .deliver_reverse_response(req.id, answer(&req))
                .unwrap();
        }
    })
}

/// A started server over [`fixtures::scripted_router`] with recording sinks.
pub struct TestServer {
    pub server: Arc<Server>,
    pub streams: Arc<RecordingStreamSink>,
    pub reverse: Arc<RecordingReverseSink>,
}

impl TestServer {
    pub fn start(config: ServerConfig) -> Self {
        let streams = RecordingStreamSink::new();
        let reverse = RecordingReverseSink::new();
        let server = Server::builder(config, Arc::new(fixtures::scripted_router()))
            .stream_sink(streams.clone())
            .reverse_sink(reverse.clone())
            .start()
            .unwrap();
        Self {
            server: Arc::new(server),
            streams,
            reverse,
        }
    }
}
