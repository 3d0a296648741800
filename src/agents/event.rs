//! Unified event type for all agent backends.

use serde::{Deserialize, Serialize};

use crate::usage::Usage;

/// Execution state of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Started,
    Completed,
    Failed,
}

/// What one canonical event describes.
///
/// The variant tag fully determines which optional fields are meaningful:
/// usage only appears on `Result` and `System`, and a `Text` event with
/// `is_partial = true` must never be treated as conversation-final.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EventKind {
    /// Session/step started.
    Init,

    /// Content chunk, possibly a streaming fragment.
    Text {
        text: String,
        #[serde(default)]
        is_partial: bool,
    },

    /// A tool invocation with name and execution state.
    ToolUse { name: String, status: ToolStatus },

    /// A step's final answer.
    Result {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },

    /// Informational, non-terminal.
    System {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },

    /// A structured failure surfaced inline by the agent.
    Error { message: String },
}

/// The normalized, agent-agnostic representation of one piece of streamed
/// output.
///
/// This is the core abstraction that lets subscribers handle different
/// agent families uniformly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(flatten)]
    pub kind: EventKind,

    /// Session identifier the source agent reported, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// The untouched source record, kept for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl AgentEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            session_id: None,
            raw: None,
        }
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }

    /// A non-JSON line degraded to verbatim text.
    pub fn raw_text(line: &str) -> Self {
        Self::new(EventKind::Text {
            text: line.to_string(),
            is_partial: false,
        })
    }

    pub fn is_final_result(&self) -> bool {
        matches!(self.kind, EventKind::Result { .. })
    }

    /// Usage attached to this event, if the variant carries one.
    pub fn usage(&self) -> Option<&Usage> {
        match &self.kind {
            EventKind::Result { usage, .. } | EventKind::System { usage, .. } => usage.as_ref(),
            _ => None,
        }
    }
}
