use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use parking_lot::Mutex;
use serde_json::Value;
use switchyard_core::jsonrpc::{
    JsonRpcMessage, Payload, INTERNAL_ERROR, INVALID_REQUEST, PARSE_ERROR, SERVER_ERROR,
    SESSION_NOT_FOUND,
};
use switchyard_core::{Engine, Peer, PeerLink, SessionId};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::sse::{push_stream, StreamGuard};
use crate::channel::{Channel, ChannelRequest, SESSION_HEADER};
use crate::error::{envelope_response, ChannelError, GatewayError};
use crate::hooks::{ClosedSignal, EstablishedSignal, SessionHooks};

/// Outbound messages an engine may queue before `Peer::send` reports backpressure.
const PEER_QUEUE: usize = 64;
/// Messages buffered per push stream before a slow reader starts losing them.
const PUSH_BUFFER: usize = 64;

const EVENT_STREAM: &str = "text/event-stream";

/// One session over streamable HTTP.
pub struct StreamableChannel {
    me: Weak<StreamableChannel>,
    established: Mutex<Option<EstablishedSignal>>,
    closed_signal: Mutex<Option<ClosedSignal>>,
    engine: OnceLock<Arc<dyn Engine>>,
    session_id: OnceLock<SessionId>,
    closed: AtomicBool,
    shutdown: CancellationToken,
    push: broadcast::Sender<JsonRpcMessage>,
    stream_open: Arc<AtomicBool>,
}

impl StreamableChannel {
    pub fn new(hooks: SessionHooks) -> Arc<Self> {
        let (push, _) = broadcast::channel(PUSH_BUFFER);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            established: Mutex::new(Some(hooks.established)),
            closed_signal: Mutex::new(Some(hooks.closed)),
            engine: OnceLock::new(),
            session_id: OnceLock::new(),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            push,
            stream_open: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Assign the session id and announce it. `None` if this channel was
    /// already initialized.
    fn establish(&self) -> Option<SessionId> {
        let signal = self.established.lock().take()?;
        let id = SessionId::new();
        // Only the holder of the signal reaches here, so the cell is empty.
        let _ = self.session_id.set(id.clone());
        if !signal.fire(id.clone()) {
            warn!(session_id = %id, "session established but not registered");
        }
        Some(id)
    }

    /// The checks every exchange after initialization must pass.
    fn validate(&self, request: &ChannelRequest) -> Result<&SessionId, Response> {
        let Some(own) = self.session_id.get() else {
            return Err(bad_request("Bad Request: Server not initialized"));
        };
        let Some(given) = request.session_id.as_ref() else {
            return Err(bad_request("Bad Request: Mcp-Session-Id header is required"));
        };
        if given != own || self.is_closed() {
            return Err(session_not_found());
        }
        Ok(own)
    }

    async fn handle_post(&self, request: ChannelRequest, body: Option<Value>) -> Response {
        let Some(body) = body else {
            return envelope_response(StatusCode::BAD_REQUEST, PARSE_ERROR, "Parse error: empty body");
        };
        let payload = match Payload::from_value(body) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, "rejecting malformed JSON-RPC payload");
                return envelope_response(
                    StatusCode::BAD_REQUEST,
                    PARSE_ERROR,
                    "Parse error: Invalid JSON-RPC message",
                );
            }
        };

        let session_id = if payload.messages().iter().any(JsonRpcMessage::is_initialize) {
            if self.session_id.get().is_some() {
                return invalid_request("Invalid Request: Server already initialized");
            }
            if payload.messages().len() > 1 {
                return invalid_request("Invalid Request: Only one initialization request is allowed");
            }
            if self.is_closed() {
                return session_not_found();
            }
            match self.establish() {
                Some(id) => id,
                None => return invalid_request("Invalid Request: Server already initialized"),
            }
        } else {
            match self.validate(&request) {
                Ok(id) => id.clone(),
                Err(response) => return response,
            }
        };

        let Some(engine) = self.engine.get() else {
            warn!(session_id = %session_id, "exchange on a channel with no engine");
            return internal_error();
        };

        let is_batch = payload.is_batch();
        let expects_reply = payload.messages().iter().any(JsonRpcMessage::is_request);
        let mut replies = Vec::new();
        for message in payload.into_messages() {
            match message {
                JsonRpcMessage::Request(req) => {
                    let id = req.id.clone();
                    let outcome = engine.handle_request(req).await;
                    replies.push(JsonRpcMessage::reply(id, outcome));
                }
                JsonRpcMessage::Notification(note) => engine.handle_notification(note).await,
                other => engine.handle_response(other).await,
            }
        }

        if !expects_reply {
            return with_session(StatusCode::ACCEPTED.into_response(), &session_id);
        }
        let body = if is_batch {
            Json(replies).into_response()
        } else {
            match replies.pop() {
                Some(reply) => Json(reply).into_response(),
                None => return internal_error(),
            }
        };
        with_session(body, &session_id)
    }

    fn handle_get(&self, request: &ChannelRequest) -> Response {
        let session_id = match self.validate(request) {
            Ok(id) => id,
            Err(response) => return response,
        };
        if !request.accepts(EVENT_STREAM) {
            return envelope_response(
                StatusCode::NOT_ACCEPTABLE,
                SERVER_ERROR,
                "Not Acceptable: Client must accept text/event-stream",
            );
        }
        let Some(guard) = StreamGuard::acquire(&self.stream_open) else {
            return envelope_response(
                StatusCode::CONFLICT,
                SERVER_ERROR,
                "Conflict: Only one SSE stream is allowed per session",
            );
        };

        debug!(session_id = %session_id, "push stream opened");
        let stream = push_stream(self.push.subscribe(), self.shutdown.clone(), guard);
        with_session(
            Sse::new(stream).keep_alive(KeepAlive::default()).into_response(),
            session_id,
        )
    }

    async fn handle_delete(&self, request: &ChannelRequest) -> Response {
        if let Err(response) = self.validate(request) {
            return response;
        }
        self.close().await;
        StatusCode::OK.into_response()
    }
}

/// Forward engine-pushed messages to whichever push stream is open, and
/// close the channel when the engine asks to.
async fn pump(
    channel: Weak<StreamableChannel>,
    mut link: PeerLink,
    shutdown: CancellationToken,
    push: broadcast::Sender<JsonRpcMessage>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = link.close.cancelled() => {
                if let Some(channel) = channel.upgrade() {
                    debug!(session_id = ?channel.session_id(), "engine requested shutdown");
                    channel.close().await;
                }
                break;
            }
            message = link.messages.recv() => match message {
                Some(message) => {
                    if push.send(message).is_err() {
                        debug!("no push stream open, message dropped");
                    }
                }
                None => break,
            },
        }
    }
}

#[async_trait]
impl Channel for StreamableChannel {
    async fn bind(&self, engine: Arc<dyn Engine>) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        self.engine
            .set(Arc::clone(&engine))
            .map_err(|_| ChannelError::AlreadyBound)?;

        let (peer, link) = Peer::pair(PEER_QUEUE);
        engine.on_bind(peer).await;
        tokio::spawn(pump(
            self.me.clone(),
            link,
            self.shutdown.clone(),
            self.push.clone(),
        ));
        Ok(())
    }

    #[instrument(skip_all, fields(method = %request.method, session_id = ?self.session_id()))]
    async fn handle(&self, request: ChannelRequest, body: Option<Value>) -> Response {
        match request.method {
            Method::POST => self.handle_post(request, body).await,
            Method::GET => self.handle_get(&request),
            Method::DELETE => self.handle_delete(&request).await,
            _ => GatewayError::MethodNotAllowed.into_response(),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        let signal = self.closed_signal.lock().take();
        if let Some(signal) = signal {
            signal.fire();
        }
        if let Some(engine) = self.engine.get() {
            engine.on_close().await;
        }
        info!(session_id = ?self.session_id(), "channel closed");
    }

    fn session_id(&self) -> Option<SessionId> {
        self.session_id.get().cloned()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for StreamableChannel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn with_session(mut response: Response, id: &SessionId) -> Response {
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

fn bad_request(message: &str) -> Response {
    envelope_response(StatusCode::BAD_REQUEST, SERVER_ERROR, message)
}

fn invalid_request(message: &str) -> Response {
    envelope_response(StatusCode::BAD_REQUEST, INVALID_REQUEST, message)
}

fn session_not_found() -> Response {
    envelope_response(StatusCode::NOT_FOUND, SESSION_NOT_FOUND, "Session not found")
}

fn internal_error() -> Response {
    envelope_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR, "Internal server error")
}
