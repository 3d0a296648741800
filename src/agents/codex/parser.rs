//! Codex-family stream parser.
//!
//! Handles JSON-RPC notifications and server requests. Responses to our
//! own requests carry no conversational content and produce no events.

use crate::agents::event::{AgentEvent, EventKind, ToolStatus};
use crate::errors::AgentError;
use crate::registry;
use crate::usage::Usage;

use super::types::{CodexItem, CodexUsage, RpcMessage, RpcNotification};
use super::AGENT_ID;

/// Stateless line parser for the codex family.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodexParser;

impl CodexParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse one raw line into zero or one canonical events.
    ///
    /// Never fails: non-JSON input degrades to a raw `Text` event.
    pub fn parse_line(&self, line: &str) -> Option<AgentEvent> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let value: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => return Some(AgentEvent::raw_text(line)),
        };
        let msg: RpcMessage = match serde_json::from_value(value.clone()) {
            Ok(m) => m,
            Err(_) => return Some(AgentEvent::raw_text(line)),
        };

        match msg {
            // Replies to requests we sent; nothing to show.
            RpcMessage::Response(_) => None,

            // Approvals are handled out-of-band by the embedding
            // application; surface the request as information only.
            RpcMessage::Request(req) => Some(
                AgentEvent::new(EventKind::System {
                    message: format!("agent requested {}", req.method),
                    usage: None,
                })
                .with_raw(value),
            ),

            RpcMessage::Notification(notif) => {
                let session_id = thread_id(&notif);
                let kind = translate(&notif)?;
                Some(AgentEvent::new(kind).with_session(session_id).with_raw(value))
            }
        }
    }

    /// Detect a structured in-stream error.
    ///
    /// Error-shaped input for this family is an `error` notification or a
    /// response carrying an `error` member. Prose and ordinary
    /// notifications are never pattern-matched.
    pub fn detect_error_from_line(&self, line: &str) -> Option<AgentError> {
        let trimmed = line.trim();
        let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        value.as_object()?;
        let msg: RpcMessage = serde_json::from_value(value.clone()).ok()?;

        let message = match &msg {
            RpcMessage::Response(resp) => {
                let body = resp.error.as_ref()?;
                body.message
                    .clone()
                    .unwrap_or_else(|| "The agent reported an error.".to_string())
            }
            RpcMessage::Notification(notif) if notif.method == "error" => notif
                .params
                .as_ref()
                .and_then(|p| {
                    p.get("message")
                        .or_else(|| p.get("error").and_then(|e| e.get("message")))
                })
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| "The agent reported an error.".to_string()),
            _ => return None,
        };

        let err = match registry::error_table_for(AGENT_ID).matches(&message) {
            Some(m) => AgentError::from_match(AGENT_ID, m, trimmed),
            None => AgentError::unknown(AGENT_ID, message, trimmed),
        };
        Some(err.with_payload(value))
    }
}

fn thread_id(notif: &RpcNotification) -> Option<String> {
    notif
        .params
        .as_ref()?
        .get("thread_id")?
        .as_str()
        .map(str::to_string)
}

fn translate(notif: &RpcNotification) -> Option<EventKind> {
    match notif.method.as_str() {
        "thread/started" => Some(EventKind::Init),

        "item/agentMessage/delta" => {
            let text = notif.params.as_ref()?.get("delta")?.as_str()?.to_string();
            Some(EventKind::Text {
                text,
                is_partial: true,
            })
        }

        "item/started" => {
            let item = decode_item(notif)?;
            tool_name(&item).map(|name| EventKind::ToolUse {
                name,
                status: ToolStatus::Started,
            })
        }

        "item/completed" => {
            let item = decode_item(notif)?;
            if item.item_type == "agentMessage" {
                let text = item.text?.trim().to_string();
                if text.is_empty() {
                    return None;
                }
                return Some(EventKind::Text {
                    text,
                    is_partial: false,
                });
            }
            tool_name(&item).map(|name| EventKind::ToolUse {
                name,
                status: if item.status.as_deref() == Some("failed") {
                    ToolStatus::Failed
                } else {
                    ToolStatus::Completed
                },
            })
        }

        "turn/completed" => {
            let usage = notif
                .params
                .as_ref()
                .and_then(|p| p.get("usage"))
                .and_then(|u| serde_json::from_value::<CodexUsage>(u.clone()).ok())
                .map(|u| Usage {
                    input_tokens: u.input_tokens,
                    output_tokens: u.output_tokens,
                    cache_read_tokens: u.cached_input_tokens,
                    ..Usage::default()
                });
            Some(EventKind::Result { text: None, usage })
        }

        "error" => {
            let message = notif
                .params
                .as_ref()
                .and_then(|p| p.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("The agent reported an error.")
                .to_string();
            Some(EventKind::Error { message })
        }

        _ => None,
    }
}

fn decode_item(notif: &RpcNotification) -> Option<CodexItem> {
    let item = notif.params.as_ref()?.get("item")?;
    serde_json::from_value(item.clone()).ok()
}

fn tool_name(item: &CodexItem) -> Option<String> {
    match item.item_type.as_str() {
        "commandExecution" => Some(
            item.command
                .clone()
                .unwrap_or_else(|| "shell".to_string()),
        ),
        "fileChange" => Some("apply_patch".to_string()),
        "mcpToolCall" => Some("mcp".to_string()),
        _ => None,
    }
}
