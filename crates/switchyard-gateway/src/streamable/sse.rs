use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::response::sse::Event;
use futures::Stream;
use switchyard_core::jsonrpc::JsonRpcMessage;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Marks the session's push stream as open; clears the mark when dropped.
pub(super) struct StreamGuard(Arc<AtomicBool>);

impl StreamGuard {
    /// `None` if a stream is already open.
    pub(super) fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(Self(Arc::clone(flag)))
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
        debug!("push stream released");
    }
}

/// Turn engine-pushed messages into `message` events until the session shuts
/// down or the sender goes away.
pub(super) fn push_stream(
    rx: broadcast::Receiver<JsonRpcMessage>,
    shutdown: CancellationToken,
    guard: StreamGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    futures::stream::unfold((rx, shutdown, guard), |(mut rx, shutdown, guard)| async move {
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return None,
                next = rx.recv() => next,
            };
            match next {
                Ok(message) => match Event::default().event("message").json_data(&message) {
                    Ok(event) => return Some((Ok(event), (rx, shutdown, guard))),
                    Err(e) => warn!(error = %e, "failed to encode pushed message"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "push stream lagged, messages dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}
