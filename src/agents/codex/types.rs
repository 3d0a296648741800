//! Codex-family JSON-RPC types.
//!
//! JSON-RPC 2.0 has three message shapes, distinguished by which fields
//! are present rather than by a tag:
//!
//! ```json
//! {"method": "item/agentMessage/delta", "params": {"delta": "Hi"}}
//! {"method": "item/commandExecution/requestApproval", "id": 5, "params": {...}}
//! {"id": 1, "result": {"thread_id": "thread-123"}}
//! ```
//!
//! The untagged enum below tries variants in order, so the order is
//! load-bearing: a server request has both `id` and `method` and must be
//! tried before `Response` (which only needs `id`), which in turn must be
//! tried before `Notification` (which only needs `method`).

use serde::Deserialize;

/// A decoded JSON-RPC message from the agent.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RpcMessage {
    /// Server-initiated request (`id` and `method`) - most specific, first.
    Request(RpcRequest),
    /// Reply to a request we sent (`id`, no `method`).
    Response(RpcResponse),
    /// Fire-and-forget notification (`method`, no `id`).
    Notification(RpcNotification),
}

/// A request the agent expects a response to.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    /// Echoed back verbatim when responding; may be a string, number, or null.
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

/// A reply to a request this side sent.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    pub id: serde_json::Value,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

/// A one-way notification; most streamed output takes this shape.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcNotification {
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

/// Error body carried by failed responses and `error` notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// An item payload inside `item/started` / `item/completed` notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct CodexItem {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Flat usage block on `turn/completed` notifications.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodexUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}
