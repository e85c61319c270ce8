//! HTTP surface: one endpoint path, everything else is 404.

use std::any::Any;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use switchyard_core::jsonrpc::INTERNAL_ERROR;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::{MakeSpan, TraceLayer};

use crate::channel::SESSION_HEADER;
use crate::dispatcher::Dispatcher;
use crate::error::{envelope_response, not_found, GatewayError};

/// Shared state handed to the endpoint handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// Build the router serving `path` exactly.
pub fn build_router(path: &str, dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route(path, any(session_endpoint))
        .fallback(path_not_found)
        .with_state(AppState { dispatcher })
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http().make_span_with(ExchangeSpan))
}

async fn session_endpoint(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, GatewayError> {
    state.dispatcher.dispatch(method, headers, body).await
}

async fn path_not_found() -> Response {
    not_found()
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    tracing::error!(panic = detail, "handler panicked");
    envelope_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR, "Internal server error")
}

/// Request span carrying the session header, when present.
#[derive(Clone, Copy, Debug)]
struct ExchangeSpan;

impl<B> MakeSpan<B> for ExchangeSpan {
    fn make_span(&mut self, request: &Request<B>) -> tracing::Span {
        let session_id = request
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        tracing::info_span!(
            "exchange",
            method = %request.method(),
            uri = %request.uri(),
            session_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Channel, ChannelFactory};
    use crate::hooks::SessionHooks;
    use crate::registry::SessionRegistry;
    use crate::testutil::{counting_engines, recording_factory};
    use axum::http::header;
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    fn app_with(channels: ChannelFactory) -> (Router, Arc<SessionRegistry>) {
        let registry = Arc::new(SessionRegistry::new());
        let (engines, _) = counting_engines();
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry), engines, channels, 4096));
        (build_router("/mcp", dispatcher), registry)
    }

    fn app() -> (Router, Arc<SessionRegistry>) {
        app_with(recording_factory().0)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 10_000).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(method: Method, uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn other_path_is_not_found() {
        let (app, registry) = app();
        for uri in ["/", "/other", "/mcp/", "/mcp/extra", "/MCP"] {
            let resp = app.clone().oneshot(request(Method::POST, uri, "")).await.unwrap();
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body_json(resp).await, json!({"error": "Not found"}));
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn query_string_still_matches() {
        let (app, _) = app();
        let resp = app
            .oneshot(request(Method::POST, "/mcp?x=1", r#"{"method":"initialize"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unsupported_verb_is_405() {
        let (app, registry) = app();
        for method in [Method::PUT, Method::PATCH, Method::OPTIONS] {
            let resp = app.clone().oneshot(request(method, "/mcp", "")).await.unwrap();
            assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(resp.headers()[header::ALLOW], "GET, POST, DELETE");
            assert_eq!(
                body_json(resp).await,
                json!({"jsonrpc":"2.0","error":{"code":-32000,"message":"Method not allowed"},"id":null})
            );
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn read_without_session_is_400() {
        let (app, _) = app();
        let resp = app.oneshot(request(Method::GET, "/mcp", "")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await,
            json!({"jsonrpc":"2.0","error":{"code":-32000,"message":"Invalid or missing session ID"},"id":null})
        );
    }

    #[tokio::test]
    async fn terminate_with_unknown_session_is_400() {
        let (app, _) = app();
        let req = Request::builder()
            .method(Method::DELETE)
            .uri("/mcp")
            .header(SESSION_HEADER, "sess_unknown")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_body_is_500() {
        let (app, registry) = app();
        let resp = app.oneshot(request(Method::POST, "/mcp", "{nope")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["error"]["code"], -32603);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let (app, _) = app();
        let big = format!("\"{}\"", "x".repeat(5000));
        let req = Request::builder()
            .method(Method::POST)
            .uri("/mcp")
            .body(Body::from(big))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(resp).await["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn create_and_reuse_through_router() {
        let (factory, built) = recording_factory();
        let (app, registry) = app_with(factory);

        let resp = app
            .clone()
            .oneshot(request(Method::POST, "/mcp", r#"{"method":"initialize"}"#))
            .await
            .unwrap();
        let id = resp.headers()[SESSION_HEADER].to_str().unwrap().to_string();
        assert_eq!(registry.len(), 1);

        let req = Request::builder()
            .method(Method::GET)
            .uri("/mcp")
            .header(SESSION_HEADER, &id)
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"method": "GET", "echo": null}));

        let built = built.lock();
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].close_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn panic_becomes_500_envelope() {
        let exploding: ChannelFactory = Arc::new(|_hooks: SessionHooks| -> Arc<dyn Channel> { panic!("boom") });
        let (app, registry) = app_with(exploding);
        let resp = app.oneshot(request(Method::POST, "/mcp", "")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(resp).await,
            json!({"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal server error"},"id":null})
        );
        assert!(registry.is_empty());
    }
}
