//! Gateway error taxonomy and its mapping onto HTTP responses.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use switchyard_core::jsonrpc::{
    JsonRpcErrorResponse, INTERNAL_ERROR, INVALID_REQUEST, SERVER_ERROR,
};

/// Verbs accepted on the session endpoint, advertised on 405.
pub const ALLOWED_METHODS: &str = "GET, POST, DELETE";

/// Errors a channel may report while binding its engine.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("channel already has an engine bound")]
    AlreadyBound,
    #[error("channel is closed")]
    Closed,
}

/// Everything that can stop an exchange before a channel answers it.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Read or terminate request without a live session.
    #[error("Invalid or missing session ID")]
    InvalidSession,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    BodyRead(String),
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// New sessions are refused once the gateway starts draining.
    #[error("Server is shutting down")]
    ShuttingDown,
    #[error("failed to bind session channel: {0}")]
    Bind(#[from] ChannelError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidSession => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::BodyRead(_) | Self::InvalidJson(_) | Self::Bind(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// JSON-RPC code carried in the error envelope.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidSession | Self::MethodNotAllowed | Self::ShuttingDown => SERVER_ERROR,
            Self::BodyTooLarge { .. } => INVALID_REQUEST,
            Self::BodyRead(_) | Self::InvalidJson(_) | Self::Bind(_) => INTERNAL_ERROR,
        }
    }

    /// Message carried in the envelope. Internal detail stays in the logs.
    pub fn public_message(&self) -> String {
        if self.status() == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidSession => "invalid_session",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::BodyTooLarge { .. } => "body_too_large",
            Self::BodyRead(_) => "body_read",
            Self::InvalidJson(_) => "invalid_json",
            Self::ShuttingDown => "shutting_down",
            Self::Bind(_) => "bind",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.error_kind(), error = %self, "exchange failed");
        } else {
            tracing::debug!(kind = self.error_kind(), status = status.as_u16(), "exchange rejected");
        }

        let mut response = envelope_response(status, self.code(), self.public_message());
        if matches!(self, Self::MethodNotAllowed) {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        }
        response
    }
}

/// Status plus `{"jsonrpc":"2.0","error":{"code":..,"message":..},"id":null}`.
pub fn envelope_response(status: StatusCode, code: i32, message: impl Into<String>) -> Response {
    (status, Json(JsonRpcErrorResponse::envelope(code, message))).into_response()
}

/// Path mismatch reply. Not the JSON-RPC envelope: existing clients match on
/// this exact shape.
pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}
