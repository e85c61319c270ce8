//! Orderly teardown: drain sessions, then stop the listener.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::SessionRegistry;

/// What a drain accomplished.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Channels that were registered when the drain began.
    pub closed: usize,
    /// Entries still present after every close resolved and were dropped.
    pub leftover: usize,
}

/// Drives the two shutdown phases for one gateway.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            timeout,
        }
    }

    /// Token the listener task watches for graceful shutdown.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Refuse new sessions, then close every registered channel concurrently
    /// and wait for all of them.
    pub async fn drain_sessions(&self, registry: &Arc<SessionRegistry>) -> DrainReport {
        let entries = registry.begin_drain();
        let closed = entries.len();
        info!(sessions = closed, "draining sessions");

        let now = Utc::now();
        futures::future::join_all(entries.iter().map(|entry| {
            debug!(
                session_id = ?entry.channel.session_id(),
                age_secs = (now - entry.created_at).num_seconds(),
                "closing session"
            );
            entry.channel.close()
        }))
        .await;
        drop(entries);

        let leftover = registry.clear();
        if leftover > 0 {
            warn!(leftover, "sessions still registered after close, dropped");
        }
        DrainReport { closed, leftover }
    }

    /// Signal the listener and wait up to the timeout for it to finish
    /// in-flight exchanges. Aborts it past the deadline.
    pub async fn stop_listener(&self, task: JoinHandle<()>) {
        self.token.cancel();
        let abort = task.abort_handle();
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(())) => info!("listener stopped"),
            Ok(Err(e)) if e.is_cancelled() => info!("listener task cancelled"),
            Ok(Err(e)) => warn!(error = %e, "listener task failed"),
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "listener did not stop in time, aborting");
                abort.abort();
            }
        }
    }
}
