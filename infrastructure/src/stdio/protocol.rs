//! JSON-RPC protocol types for stdio backends.
//!
//! # Protocol Overview
//!
//! - **Requests**: gateway → backend (`initialize`, `tools/list`, `tools/call`)
//! - **Responses**: backend → gateway (result or error)
//! - **Notifications**: either direction, no `id` (e.g.
//!   `notifications/initialized`, `notifications/tools/list_changed`)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use toolgate_domain::{Handshake, ListKind, ToolDefinition, ToolError, ToolResult};

/// Protocol revision announced in `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Global request ID counter for JSON-RPC requests.
static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// JSON-RPC request
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Creates a new JSON-RPC request with an auto-generated ID.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: next_id(),
            method: method.into(),
            params,
        }
    }
}

/// Outgoing JSON-RPC notification (no `id`, no reply expected)
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    /// Splits the response into its result or its error object.
    pub fn into_result(self) -> Result<Value, ToolError> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error.into()),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<RpcError> for ToolError {
    fn from(error: RpcError) -> Self {
        let tool_error = ToolError::new(error.code, error.message);
        match error.data {
            Some(data) => tool_error.with_data(data),
            None => tool_error,
        }
    }
}

/// Outgoing response to a request the backend sent us
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponseOut {
    pub jsonrpc: &'static str,
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponseOut {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

// ==================== Method payloads ====================

/// Parameters for `initialize`.
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "toolgate",
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfo {
    name: String,
    #[serde(default)]
    version: Option<String>,
}

/// Result of `initialize`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    protocol_version: Option<String>,
    #[serde(default)]
    capabilities: Option<Value>,
    server_info: ServerInfo,
    #[serde(default)]
    instructions: Option<String>,
}

impl InitializeResult {
    pub fn into_handshake(self) -> Handshake {
        let mut handshake = Handshake::new(self.server_info.name);
        handshake.server_version = self.server_info.version;
        handshake.protocol_version = self.protocol_version;
        handshake.instructions = self.instructions;
        if let Some(capabilities) = self.capabilities {
            handshake.capabilities = capabilities;
        }
        handshake
    }
}

/// Result of one `tools/list` page
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Parameters for `tools/list`, with the cursor of the previous page.
pub fn list_tools_params(cursor: Option<&str>) -> Option<Value> {
    cursor.map(|c| json!({ "cursor": c }))
}

/// Parameters for `tools/call`.
pub fn call_tool_params(name: &str, arguments: &Map<String, Value>) -> Value {
    json!({ "name": name, "arguments": arguments })
}

/// Parses a `tools/call` result.
pub fn parse_call_result(value: Value) -> Result<ToolResult, serde_json::Error> {
    serde_json::from_value(value)
}

/// Maps a backend notification method to the list it invalidates.
pub fn list_changed_kind(method: &str) -> Option<ListKind> {
    match method {
        "notifications/tools/list_changed" => Some(ListKind::Tools),
        "notifications/resources/list_changed" => Some(ListKind::Resources),
        "notifications/prompts/list_changed" => Some(ListKind::Prompts),
        _ => None,
    }
}
