//! Idle-session reaper thread.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::trace;

use crate::config::ConfigError;
use crate::streams::StreamManager;

/// Handle to the running reaper. Dropping the stop sender ends the loop.
pub(crate) struct Reaper {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Spawn `tether-reaper`, scanning every `interval` for sessions idle
    /// longer than `timeout`.
    pub(crate) fn spawn(
        streams: StreamManager,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Self, ConfigError> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let thread = thread::Builder::new()
            .name("tether-reaper".into())
            .spawn(move || run(streams, timeout, interval, stop_rx))
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: format!("tether-reaper: {e}"),
            })?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Stop and join. Returns `true` if the thread was joined cleanly.
    pub(crate) fn stop(&mut self) -> bool {
        self.stop_tx = None;
        match self.thread.take() {
            Some(h) => h.join().is_ok(),
            None => false,
        }
    }
}

fn run(streams: StreamManager, timeout: Duration, interval: Duration, stop_rx: Receiver<()>) {
    loop {
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                let n = streams.expire_idle(Instant::now(), timeout);
                if n > 0 {
                    trace!(expired = n, "reaper pass");
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tether_core::{SessionId, StreamMsgKind, StreamShape};

    #[test]
    fn reaper_expires_idle_session_and_stops() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = move |id: SessionId, kind: StreamMsgKind, _: Vec<u8>| {
            let _ = tx.send((id, kind));
        };
        let streams = StreamManager::new(Arc::new(sink), 4);
        let id = streams
            .open(
                StreamShape::Bidi,
                Box::new(|io| {
                    while io.recv()?.is_some() {}
                    Ok(())
                }),
            )
            .unwrap();
        let mut reaper = Reaper::spawn(
            streams.clone(),
            Duration::from_millis(30),
            Duration::from_millis(5),
        )
        .unwrap();
        let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(got, (id, StreamMsgKind::Error));
        assert!(reaper.stop());
        assert!(!reaper.stop());
    }
}
