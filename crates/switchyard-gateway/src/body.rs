//! Request body collection.

use axum::body::Body;
use bytes::BytesMut;
use futures::StreamExt;
use serde_json::Value;

use crate::error::GatewayError;

/// Drain `body` into one JSON value.
///
/// An empty body yields `Ok(None)`: the caller treats that as "no payload",
/// never as a parse failure. Anything else must parse as JSON. The limit is
/// checked as chunks arrive so an oversized body is never fully buffered.
pub async fn collect_message(body: Body, limit: usize) -> Result<Option<Value>, GatewayError> {
    let mut chunks = body.into_data_stream();
    let mut buf = BytesMut::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| GatewayError::BodyRead(e.to_string()))?;
        if buf.len() + chunk.len() > limit {
            return Err(GatewayError::BodyTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }

    if buf.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&buf)?))
}
