//! The protocol engine contract.
//!
//! An engine implements the session's actual protocol semantics. The gateway
//! never looks inside it: a channel feeds it decoded JSON-RPC messages and
//! writes back whatever it answers. Each session gets its own engine instance
//! from a [`SessionFactory`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::PeerError;
use crate::jsonrpc::{ErrorObject, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest};

/// Trait implemented by every protocol engine.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Called once when a channel binds this engine. The peer stays valid
    /// until the channel closes.
    async fn on_bind(&self, _peer: Peer) {}

    async fn handle_request(&self, request: JsonRpcRequest) -> Result<Value, ErrorObject>;

    async fn handle_notification(&self, _notification: JsonRpcNotification) {}

    /// Responses (or error responses) the client sends back for
    /// server-initiated requests.
    async fn handle_response(&self, _message: JsonRpcMessage) {}

    /// Called once while the owning channel tears down.
    async fn on_close(&self) {}
}

/// Produces a fresh engine for every new session.
pub type SessionFactory = Arc<dyn Fn() -> Arc<dyn Engine> + Send + Sync>;

/// Wrap a constructor closure as a [`SessionFactory`].
pub fn session_factory<E, F>(make: F) -> SessionFactory
where
    E: Engine,
    F: Fn() -> E + Send + Sync + 'static,
{
    Arc::new(move || Arc::new(make()) as Arc<dyn Engine>)
}

/// An engine's handle back to its client: push server-initiated messages and
/// ask for the session to be shut down.
#[derive(Clone, Debug)]
pub struct Peer {
    outbound: mpsc::Sender<JsonRpcMessage>,
    close: CancellationToken,
}

/// Channel-side end of a [`Peer`].
#[derive(Debug)]
pub struct PeerLink {
    pub messages: mpsc::Receiver<JsonRpcMessage>,
    pub close: CancellationToken,
}

impl Peer {
    /// Create a connected peer/link pair with a bounded outbound queue.
    pub fn pair(capacity: usize) -> (Self, PeerLink) {
        let (tx, rx) = mpsc::channel(capacity);
        let close = CancellationToken::new();
        (
            Self {
                outbound: tx,
                close: close.clone(),
            },
            PeerLink { messages: rx, close },
        )
    }

    /// Queue a message for the client's push stream. Never waits.
    pub fn send(&self, message: JsonRpcMessage) -> Result<(), PeerError> {
        if self.close.is_cancelled() {
            return Err(PeerError::Disconnected);
        }
        self.outbound.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PeerError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => PeerError::Disconnected,
        })
    }

    pub fn notify(&self, method: impl Into<String>, params: Option<Value>) -> Result<(), PeerError> {
        self.send(JsonRpcMessage::Notification(JsonRpcNotification::new(method, params)))
    }

    /// Ask the owning channel to close the session.
    pub fn close(&self) {
        self.close.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled() || self.outbound.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Engine for Echo {
        async fn handle_request(&self, request: JsonRpcRequest) -> Result<Value, ErrorObject> {
            Ok(request.params.unwrap_or(Value::Null))
        }
    }

    #[tokio::test]
    async fn factory_creates_distinct_instances() {
        let factory = session_factory(|| Echo);
        let a = factory();
        let b = factory();
        assert!(!std::ptr::addr_eq(Arc::as_ptr(&a), Arc::as_ptr(&b)));

        let req = JsonRpcRequest::new(crate::jsonrpc::RequestId::Number(1), "echo", Some(json!({"a": 1})));
        assert_eq!(a.handle_request(req).await.unwrap(), json!({"a": 1}));
    }

    #[tokio::test]
    async fn peer_delivers_notifications() {
        let (peer, mut link) = Peer::pair(4);
        peer.notify("notifications/message", Some(json!({"level": "info"}))).unwrap();

        let msg = link.messages.recv().await.unwrap();
        let JsonRpcMessage::Notification(n) = msg else {
            panic!("expected notification");
        };
        assert_eq!(n.method, "notifications/message");
    }

    #[test]
    fn peer_reports_backpressure() {
        let (peer, _link) = Peer::pair(1);
        peer.notify("a", None).unwrap();
        assert_eq!(peer.notify("b", None), Err(PeerError::Backpressure));
    }

    #[test]
    fn peer_close_cancels_link() {
        let (peer, link) = Peer::pair(1);
        assert!(!peer.is_closed());
        peer.close();
        assert!(link.close.is_cancelled());
        assert!(peer.is_closed());
        assert_eq!(peer.notify("late", None), Err(PeerError::Disconnected));
    }

    #[test]
    fn dropped_link_disconnects_peer() {
        let (peer, link) = Peer::pair(1);
        drop(link);
        assert!(peer.is_closed());
        assert_eq!(peer.notify("x", None), Err(PeerError::Disconnected));
    }
}
