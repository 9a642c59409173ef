//! JSON-RPC protocol types.
//!
//! The gateway never interprets request or response payloads beyond what
//! routing requires: bodies travel through the proxy as raw bytes, and these
//! types are the minimal envelopes parsed out of them for method dispatch,
//! access-policy checks, archive classification, and cache-validity checks.

use std::borrow::Cow;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for constructing envelopes without allocation.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// JSON-RPC 2.0 request envelope.
///
/// Parsed leniently: a body that is not a valid envelope yields the default
/// (empty method, null id), and the access policy decides what happens next.
/// The client-supplied `id` is preserved for the client-facing reply even
/// when it is rewritten on the upstream wire (WebSocket variant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Cow<'static, str>,
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl Default for JsonRpcRequest {
    fn default() -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            id: Value::Null,
            method: String::new(),
            params: Vec::new(),
        }
    }
}

impl JsonRpcRequest {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Vec<Value>, id: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, id, method: method.into(), params }
    }
}

/// JSON-RPC 2.0 response envelope, used only for inspection.
///
/// A `"result": null` field deserializes to `None`, so `result.is_some()`
/// doubles as the "non-null result present" check the cache relies on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// True when the envelope carries no error (absent, or code 0).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.as_ref().is_none_or(|e| e.code == 0)
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Builds the JSON-RPC error envelope the gateway writes back to clients
/// for access-policy rejections and strategy failures (code `-32602`).
#[must_use]
pub fn error_response_bytes(id: &Value, reason: &str) -> Bytes {
    let body = serde_json::json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": {
            "code": -32602,
            "message": reason,
        },
    });
    Bytes::from(body.to_string())
}

/// True when the body parses as a JSON object without a top-level `error`
/// field. Used by the race strategy to pick a winning reply. Bytes that do
/// not even form a JSON object are never a success: a truncated or garbage
/// body from a fast-but-broken upstream must not beat a slower healthy one.
#[must_use]
pub fn no_error_field(body: &[u8]) -> bool {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => !map.contains_key("error"),
        _ => false,
    }
}

/// True when the body parses as a JSON object — the minimum bar for
/// surfacing it to a client as an upstream-formulated reply.
#[must_use]
pub fn is_json_object(body: &[u8]) -> bool {
    matches!(serde_json::from_slice::<Value>(body), Ok(Value::Object(_)))
}
