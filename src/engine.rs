//! The engine the binary serves: enough protocol to handshake and list an
//! empty tool set.

use async_trait::async_trait;
use serde_json::{json, Value};
use switchyard_core::jsonrpc::{ErrorObject, JsonRpcRequest, INITIALIZE_METHOD};
use switchyard_core::Engine;

/// Protocol revision answered when the client does not name one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-03-26";

#[derive(Debug, Default)]
pub struct BasicEngine;

#[async_trait]
impl Engine for BasicEngine {
    async fn handle_request(&self, request: JsonRpcRequest) -> Result<Value, ErrorObject> {
        match request.method.as_str() {
            INITIALIZE_METHOD => {
                let requested = request.params.as_ref().and_then(|p| p.get("protocolVersion"));
                let version = match requested {
                    None | Some(Value::Null) => DEFAULT_PROTOCOL_VERSION,
                    Some(Value::String(v)) => v.as_str(),
                    Some(_) => {
                        return Err(ErrorObject::invalid_params("protocolVersion must be a string"))
                    }
                };
                Ok(json!({
                    "protocolVersion": version,
                    "capabilities": { "tools": {} },
                    "serverInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }))
            }
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": [] })),
            other => {
                tracing::debug!(method = other, "unknown method");
                Err(ErrorObject::method_not_found(other))
            }
        }
    }
}
