//! Background pruning of the state-storage engine.

use crate::ss::StateStore;
use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Owns the thread that trims old state-storage versions.
///
/// Every `prune_interval`, the loop reads the engine's latest version `V` and
/// prunes all versions `<= V - keep_recent` when that cutoff is positive.
/// Prune failures are logged and retried at the next interval; they are never
/// silently dropped.
pub struct PruningManager {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PruningManager {
    /// Spawn the pruning loop.
    pub fn start(ss: Arc<dyn StateStore>, keep_recent: i64, prune_interval: Duration) -> Self {
        let (shutdown, rx) = bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("strata-pruning".to_string())
            .spawn(move || {
                tracing::debug!(keep_recent, ?prune_interval, "pruning loop started");
                loop {
                    match rx.recv_timeout(prune_interval) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }

                    let latest = ss.latest_version();
                    let cutoff = latest - keep_recent;
                    if cutoff <= 0 {
                        continue;
                    }

                    match ss.prune(cutoff) {
                        Ok(()) => {
                            tracing::debug!(latest, cutoff, "pruned state storage");
                        }
                        Err(e) => {
                            tracing::error!(cutoff, error = %e, "state storage prune failed; retrying next interval");
                        }
                    }
                }
                tracing::debug!("pruning loop stopped");
            })
            .expect("failed to spawn pruning thread");

        Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
        }
    }

    /// Signal shutdown and wait for the loop to exit after its current pass.
    pub fn stop(&mut self) {
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PruningManager {
    fn drop(&mut self) {
        self.stop();
    }
}
