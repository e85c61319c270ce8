//! JSON-RPC 2.0 wire types shared by the gateway and engines.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Standard JSON-RPC error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

// Implementation-defined server errors
/// Session/transport level rejection (bad or missing session, bad verb, draining).
pub const SERVER_ERROR: i32 = -32000;
/// The session header named a session this channel does not own.
pub const SESSION_NOT_FOUND: i32 = -32001;

/// Method name of the handshake request that establishes a session.
pub const INITIALIZE_METHOD: &str = "initialize";

/// The `"jsonrpc": "2.0"` marker. Rejects any other version on input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Version;

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == "2.0" {
            Ok(Self)
        } else {
            Err(de::Error::custom(format!("unsupported jsonrpc version: {raw}")))
        }
    }
}

/// Request id: JSON-RPC allows numbers and strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Version,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Version,
            id,
            method: method.into(),
            params,
        }
    }

    pub fn is_initialize(&self) -> bool {
        self.method == INITIALIZE_METHOD
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: Version,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Version,
            method: method.into(),
            params,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Version,
    pub id: RequestId,
    pub result: Value,
}

/// JSON-RPC error object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, msg)
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, msg)
    }
}

/// Error reply. `id` serializes as `null` when the failing request could not
/// be identified, which is also the shape of the gateway's error envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorResponse {
    pub jsonrpc: Version,
    pub error: ErrorObject,
    pub id: Option<RequestId>,
}

impl JsonRpcErrorResponse {
    pub fn new(id: Option<RequestId>, error: ErrorObject) -> Self {
        Self {
            jsonrpc: Version,
            error,
            id,
        }
    }

    /// `{"jsonrpc":"2.0","error":{"code":..,"message":..},"id":null}`
    pub fn envelope(code: i32, message: impl Into<String>) -> Self {
        Self::new(None, ErrorObject::new(code, message))
    }
}

/// Any single JSON-RPC message. Variant order matters for untagged decoding:
/// a request is tried before a notification so an `id` is never dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
    Error(JsonRpcErrorResponse),
}

impl JsonRpcMessage {
    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request(_))
    }

    pub fn is_initialize(&self) -> bool {
        matches!(self, Self::Request(req) if req.is_initialize())
    }

    /// Reply for `request` built from an engine outcome.
    pub fn reply(id: RequestId, outcome: Result<Value, ErrorObject>) -> Self {
        match outcome {
            Ok(result) => Self::Response(JsonRpcResponse {
                jsonrpc: Version,
                id,
                result,
            }),
            Err(error) => Self::Error(JsonRpcErrorResponse::new(Some(id), error)),
        }
    }
}

/// A POST body: one message or a non-empty batch.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Single(JsonRpcMessage),
    Batch(Vec<JsonRpcMessage>),
}

impl Payload {
    /// Decode a collected JSON body. Empty batches are rejected.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(de::Error::custom("empty batch"));
                }
                let messages = items
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<Result<Vec<JsonRpcMessage>, _>>()?;
                Ok(Self::Batch(messages))
            }
            other => Ok(Self::Single(serde_json::from_value(other)?)),
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }

    pub fn messages(&self) -> &[JsonRpcMessage] {
        match self {
            Self::Single(msg) => std::slice::from_ref(msg),
            Self::Batch(msgs) => msgs,
        }
    }

    pub fn into_messages(self) -> Vec<JsonRpcMessage> {
        match self {
            Self::Single(msg) => vec![msg],
            Self::Batch(msgs) => msgs,
        }
    }
}
