//! Reverse-call channel: calls from the native core into the front end.
//!
//! Each outstanding call owns a one-shot slot keyed by [`RequestId`] in a
//! shared table. The front end answers later, from any thread, through
//! [`ReverseChannel::complete`]. Removing the slot from the table is what
//! fulfils it, so a second answer for the same id finds nothing and is
//! reported as [`AlreadyCompleted`](ReverseCallError::AlreadyCompleted).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use tether_core::{RequestId, ReverseCallError};

use crate::sync::lock;

type Outcome = Result<Vec<u8>, ReverseCallError>;

/// Hands a reverse call to the front end.
///
/// Must not block waiting for the answer: the answer arrives separately
/// through [`ReverseChannel::complete`], possibly before `call` returns.
pub trait ReverseCallSink: Send + Sync {
    /// Forward one request. Fails with
    /// [`NoCallback`](ReverseCallError::NoCallback) if nobody is listening.
    fn call(&self, request: RequestId, method: &str, payload: &[u8]) -> Result<(), ReverseCallError>;
}

impl<F> ReverseCallSink for F
where
    F: Fn(RequestId, &str, &[u8]) -> Result<(), ReverseCallError> + Send + Sync,
{
    fn call(&self, request: RequestId, method: &str, payload: &[u8]) -> Result<(), ReverseCallError> {
        self(request, method, payload)
    }
}

/// Table of pending reverse calls.
pub struct ReverseChannel {
    pending: Mutex<HashMap<RequestId, Sender<Outcome>>>,
    sink: Arc<dyn ReverseCallSink>,
    timeout: Duration,
}

impl ReverseChannel {
    /// Create a channel forwarding through `sink`; [`call`](Self::call)
    /// waits at most `timeout`.
    pub fn new(sink: Arc<dyn ReverseCallSink>, timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            sink,
            timeout,
        }
    }

    /// Issue a call and return without waiting for the answer.
    pub fn begin(&self, method: &str, payload: &[u8]) -> Result<PendingReply<'_>, ReverseCallError> {
        let id = RequestId::next();
        let (tx, rx) = crossbeam_channel::bounded(1);
        lock(&self.pending).insert(id, tx);
        if let Err(e) = self.sink.call(id, method, payload) {
            lock(&self.pending).remove(&id);
            return Err(e);
        }
        debug!(request = %id, method, "reverse call issued");
        Ok(PendingReply {
            id,
            rx,
            channel: self,
        })
    }

    /// Issue a call and block until it is answered, times out, or is cancelled.
    pub fn call(&self, method: &str, payload: &[u8]) -> Outcome {
        self.begin(method, payload)?.wait()
    }

    /// Deliver the front end's answer for `id`.
    pub fn complete(&self, id: RequestId, payload: Vec<u8>) -> Result<(), ReverseCallError> {
        let slot = lock(&self.pending).remove(&id);
        match slot {
            Some(tx) => {
                // The waiter may have given up already; the answer is dropped.
                let _ = tx.send(Ok(payload));
                Ok(())
            }
            None if id.was_issued() => {
                warn!(request = %id, "duplicate or late reverse-call response");
                Err(ReverseCallError::AlreadyCompleted { request: id })
            }
            None => {
                warn!(request = %id, "response for unknown reverse-call request");
                Err(ReverseCallError::UnknownRequest { request: id })
            }
        }
    }

    /// Fail every pending call with `Cancelled`. Returns how many there were.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = lock(&self.pending).drain().collect();
        for (id, tx) in &drained {
            let _ = tx.send(Err(ReverseCallError::Cancelled { request: *id }));
        }
        if !drained.is_empty() {
            debug!(cancelled = drained.len(), "pending reverse calls cancelled");
        }
        drained.len()
    }

    /// Number of calls awaiting an answer.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// The default wait used by [`call`](Self::call) and [`PendingReply::wait`].
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// An issued reverse call whose answer has not been collected.
///
/// Dropping it abandons the call; a later answer is then reported as
/// already completed.
pub struct PendingReply<'a> {
    id: RequestId,
    rx: Receiver<Outcome>,
    channel: &'a ReverseChannel,
}

impl PendingReply<'_> {
    /// The request id the front end will answer.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait up to the channel's configured timeout.
    pub fn wait(self) -> Outcome {
        let timeout = self.channel.timeout;
        self.wait_timeout(timeout)
    }

    /// Wait up to `timeout`.
    pub fn wait_timeout(self, timeout: Duration) -> Outcome {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                if lock(&self.channel.pending).remove(&self.id).is_some() {
                    debug!(request = %self.id, "reverse call timed out");
                    return Err(ReverseCallError::Timeout { request: self.id });
                }
                // Answered between the timeout and the removal.
                self.rx
                    .try_recv()
                    .unwrap_or(Err(ReverseCallError::Timeout { request: self.id }))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(ReverseCallError::Cancelled { request: self.id })
            }
        }
    }

    /// Take the answer if it has already arrived.
    pub fn try_take(&self) -> Option<Outcome> {
        self.rx.try_recv().ok()
    }
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        lock(&self.channel.pending).remove(&self.id);
    }
}
