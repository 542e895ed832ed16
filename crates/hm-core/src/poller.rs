//! Background thread driving presence polls.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};

use crate::presence::PresenceTracker;

/// Runs [`PresenceTracker::tick`] on its own thread at a fixed interval.
///
/// Stopping disconnects the control channel, which wakes the thread at once
/// instead of waiting out the current interval.
#[derive(Debug, Default)]
pub struct PresencePoller {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PresencePoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts polling. Does nothing if already running.
    pub fn start(&mut self, tracker: Arc<PresenceTracker>, interval: Duration) {
        if self.is_running() {
            tracing::warn!("presence poller already running");
            return;
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let spawned = std::thread::Builder::new()
            .name("hm-presence-poller".to_string())
            .spawn(move || {
                tracing::info!(?interval, "presence poller started");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => tracker.tick(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::info!("presence poller stopped");
            });

        match spawned {
            Ok(handle) => {
                self.stop_tx = Some(stop_tx);
                self.handle = Some(handle);
            }
            Err(e) => tracing::warn!(error = %e, "failed to spawn presence poller"),
        }
    }

    /// Stops polling and waits for the thread. Safe to call repeatedly.
    pub fn stop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("presence poller thread panicked");
            }
        }
    }

    pub const fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for PresencePoller {
    fn drop(&mut self) {
        self.stop();
    }
}
