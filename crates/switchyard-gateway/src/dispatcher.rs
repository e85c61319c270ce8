//! Routes each exchange to a new, existing, or no session.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Method};
use axum::response::Response;
use serde_json::Value;
use switchyard_core::SessionFactory;
use tracing::{debug, instrument};

use crate::body::collect_message;
use crate::channel::{ChannelFactory, ChannelRequest};
use crate::error::GatewayError;
use crate::hooks::SessionHooks;
use crate::registry::SessionRegistry;

/// HTTP verb classes the session endpoint understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    /// POST: send a message, creating the session if needed.
    Write,
    /// GET: open or continue the server push stream.
    Read,
    /// DELETE: end the session.
    Terminate,
}

impl RequestKind {
    pub fn classify(method: &Method) -> Option<Self> {
        if method == Method::POST {
            Some(Self::Write)
        } else if method == Method::GET {
            Some(Self::Read)
        } else if method == Method::DELETE {
            Some(Self::Terminate)
        } else {
            None
        }
    }
}

/// Decides CREATE / REUSE / REJECT for every exchange.
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    session_factory: SessionFactory,
    channel_factory: ChannelFactory,
    max_body_bytes: usize,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<SessionRegistry>,
        session_factory: SessionFactory,
        channel_factory: ChannelFactory,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            registry,
            session_factory,
            channel_factory,
            max_body_bytes,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    #[instrument(skip_all, fields(method = %method))]
    pub async fn dispatch(
        &self,
        method: Method,
        headers: HeaderMap,
        body: Body,
    ) -> Result<Response, GatewayError> {
        let kind = RequestKind::classify(&method).ok_or(GatewayError::MethodNotAllowed)?;
        let request = ChannelRequest::new(method, headers);

        if kind == RequestKind::Write {
            let body = collect_message(body, self.max_body_bytes).await?;
            // Looked up after the body arrives so a session closed mid-read
            // is not handed another exchange.
            let existing = request.session_id.as_ref().and_then(|id| self.registry.get(id));
            return match existing {
                Some(channel) => {
                    debug!(session_id = ?request.session_id, "reusing session");
                    Ok(channel.handle(request, body).await)
                }
                None => self.create(request, body).await,
            };
        }

        let Some(channel) = request.session_id.as_ref().and_then(|id| self.registry.get(id)) else {
            debug!(session_id = ?request.session_id, kind = ?kind, "no live session");
            return Err(GatewayError::InvalidSession);
        };
        Ok(channel.handle(request, None).await)
    }

    /// Instantiate an engine, wrap it in a fresh channel and hand it the body.
    /// The channel registers itself if and when it is established; one that
    /// is not established by the end of the exchange is closed before it
    /// returns.
    async fn create(
        &self,
        request: ChannelRequest,
        body: Option<Value>,
    ) -> Result<Response, GatewayError> {
        if self.registry.is_draining() {
            return Err(GatewayError::ShuttingDown);
        }
        if let Some(stale) = &request.session_id {
            debug!(session_id = %stale, "unknown session id on write, creating new session");
        }

        let engine = (self.session_factory)();
        let (hooks, binding) = SessionHooks::new(&self.registry);
        let channel = (self.channel_factory)(hooks);
        binding.attach(&channel);
        channel.bind(engine).await?;

        let response = channel.handle(request, body).await;

        let Some(session_id) = channel.session_id() else {
            debug!(status = %response.status(), "exchange did not establish a session, closing channel");
            channel.close().await;
            return Ok(response);
        };
        if self.registry.is_draining() {
            debug!(session_id = %session_id, "closing session created during drain");
            channel.close().await;
            return Err(GatewayError::ShuttingDown);
        }
        Ok(response)
    }
}
