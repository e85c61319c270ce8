//! The per-session channel contract.
//!
//! A channel owns exactly one engine and the wire encoding in front of it.
//! The gateway only ever calls [`Channel::bind`], [`Channel::handle`] and
//! [`Channel::close`]; the channel reports its own establishment and closure
//! back through the [`SessionHooks`](crate::hooks::SessionHooks) it was
//! constructed with.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, Method};
use axum::response::Response;
use serde_json::Value;
use switchyard_core::{Engine, SessionId};

use crate::error::ChannelError;
use crate::hooks::SessionHooks;

/// Header carrying the session id on every exchange after the first.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// One inbound exchange as seen by a channel.
#[derive(Clone, Debug)]
pub struct ChannelRequest {
    pub method: Method,
    pub headers: HeaderMap,
    /// Session id taken from [`SESSION_HEADER`], if present and readable.
    pub session_id: Option<SessionId>,
}

impl ChannelRequest {
    pub fn new(method: Method, headers: HeaderMap) -> Self {
        let session_id = session_id_from_headers(&headers);
        Self {
            method,
            headers,
            session_id,
        }
    }

    /// Whether any `Accept` header value lists `mime`.
    pub fn accepts(&self, mime: &str) -> bool {
        self.headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|part| part.split(';').next().map(str::trim) == Some(mime))
    }
}

/// Read the session header. A repeated header resolves to its first
/// occurrence; the rest are ignored. Empty or non-text values count as absent.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(SESSION_HEADER)
        .iter()
        .next()
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(SessionId::from_raw)
}

/// Per-session adapter between the wire and one engine instance.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    /// Attach the engine. Resolves once the channel can handle exchanges.
    async fn bind(&self, engine: Arc<dyn Engine>) -> Result<(), ChannelError>;

    /// Answer exactly one exchange. Always produces a response, errors included.
    async fn handle(&self, request: ChannelRequest, body: Option<Value>) -> Response;

    /// Release the session. Idempotent; resolves once resources are released.
    async fn close(&self);

    /// The id assigned on establishment, if any.
    fn session_id(&self) -> Option<SessionId>;

    fn is_closed(&self) -> bool;
}

/// Builds a channel around the hooks the dispatcher prepared for it.
pub type ChannelFactory = Arc<dyn Fn(SessionHooks) -> Arc<dyn Channel> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn session_header_is_read() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("sess_abc"));
        assert_eq!(session_id_from_headers(&headers), Some(SessionId::from_raw("sess_abc")));
    }

    #[test]
    fn repeated_session_header_takes_first() {
        let mut headers = HeaderMap::new();
        headers.append(SESSION_HEADER, HeaderValue::from_static("first"));
        headers.append(SESSION_HEADER, HeaderValue::from_static("second"));
        assert_eq!(session_id_from_headers(&headers), Some(SessionId::from_raw("first")));
    }

    #[test]
    fn blank_session_header_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("  "));
        assert_eq!(session_id_from_headers(&headers), None);
        assert_eq!(session_id_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn non_text_session_header_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap());
        assert_eq!(session_id_from_headers(&headers), None);
    }

    #[test]
    fn accepts_matches_list_entries() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream;q=0.9"),
        );
        let req = ChannelRequest::new(Method::GET, headers);
        assert!(req.accepts("text/event-stream"));
        assert!(req.accepts("application/json"));
        assert!(!req.accepts("text/html"));
    }

    #[test]
    fn missing_accept_accepts_nothing() {
        let req = ChannelRequest::new(Method::GET, HeaderMap::new());
        assert!(!req.accepts("text/event-stream"));
    }
}
