//! Claude-family JSON types for stream parsing.
//!
//! One JSON object per line. The `type` field selects which optional
//! fields are populated:
//!
//! ```json
//! {"type":"system","subtype":"init","session_id":"sess-1"}
//! {"type":"assistant","session_id":"sess-1","message":{"role":"assistant","content":[{"type":"text","text":"Hi"}]}}
//! {"type":"content_block_delta","delta":{"type":"text_delta","text":"Hel"}}
//! {"type":"result","subtype":"success","result":"Done.","usage":{"input_tokens":10},"modelUsage":{"m":{"inputTokens":10,"contextWindow":200000}},"total_cost_usd":0.03}
//! {"type":"error","error":{"message":"Rate limit reached"}}
//! ```
//!
//! Result lines may carry both a flat `usage` object and a per-model
//! `modelUsage` map; older CLI versions omit the map.

use serde::Deserialize;
use std::collections::HashMap;

use crate::usage::{ModelUsage, Usage};

/// One decoded line of claude-family output.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaudeLine {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub subtype: Option<String>,

    #[serde(default)]
    pub session_id: Option<String>,

    /// Assistant message with content blocks.
    #[serde(default)]
    pub message: Option<AssistantMessage>,

    /// Streaming text fragment.
    #[serde(default)]
    pub delta: Option<Delta>,

    /// Final answer text on result lines.
    #[serde(default)]
    pub result: Option<String>,

    /// Result lines set this when the step failed.
    #[serde(default)]
    pub is_error: Option<bool>,

    /// Structured error payload on error lines.
    #[serde(default)]
    pub error: Option<ErrorBody>,

    /// Flat legacy usage object.
    #[serde(default)]
    pub usage: Option<Usage>,

    /// Per-model usage breakdown (newer CLI versions).
    #[serde(default, rename = "modelUsage")]
    pub model_usage: Option<HashMap<String, ModelUsage>>,

    /// Total step cost; already summed across models.
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
}

/// Assistant message carrying content blocks.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

/// A content block in a message: `text` or `tool_use`.
///
/// Different block types populate different fields, so everything beyond
/// the tag is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,

    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub input: Option<serde_json::Value>,
}

/// Streaming delta fragment.
#[derive(Debug, Clone, Deserialize)]
pub struct Delta {
    #[serde(rename = "type")]
    pub delta_type: String,

    #[serde(default)]
    pub text: Option<String>,
}

/// Structured error payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub code: Option<String>,
}
