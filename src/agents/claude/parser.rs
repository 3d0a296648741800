//! Claude-family stream parser.
//!
//! Translates one line of stream-json output into at most one canonical
//! event. The transport delivers complete lines, so there is no buffering
//! here - the parser holds no state at all.

use crate::agents::event::{AgentEvent, EventKind, ToolStatus};
use crate::errors::AgentError;
use crate::registry;
use crate::usage::{aggregate_usage, Usage};

use super::types::ClaudeLine;
use super::AGENT_ID;

/// Stateless line parser for the claude family.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaudeParser;

impl ClaudeParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse one raw line into zero or one canonical events.
    ///
    /// Never fails: input that does not decode as JSON (or decodes to
    /// something other than this family's schema) degrades to a raw
    /// `Text` event carrying the line verbatim. Unparseable output is
    /// never silently dropped.
    pub fn parse_line(&self, line: &str) -> Option<AgentEvent> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let value: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => return Some(AgentEvent::raw_text(line)),
        };
        let parsed: ClaudeLine = match serde_json::from_value(value.clone()) {
            Ok(p) => p,
            Err(_) => return Some(AgentEvent::raw_text(line)),
        };

        let session_id = parsed.session_id.clone();
        let kind = translate(&parsed)?;
        Some(AgentEvent::new(kind).with_session(session_id).with_raw(value))
    }

    /// Detect a structured in-stream error.
    ///
    /// Only structurally error-shaped lines are inspected: an `error`
    /// line, an object carrying an `error` member, or a result flagged
    /// with `is_error`. Prose lines - even valid JSON - are never
    /// pattern-matched, so an agent narrating its work cannot trip this.
    pub fn detect_error_from_line(&self, line: &str) -> Option<AgentError> {
        let trimmed = line.trim();
        let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        let obj = value.as_object()?;

        // Inspect the raw value rather than the typed line: error payloads
        // show up both as objects and as bare strings in the wild.
        let event_type = obj.get("type").and_then(|t| t.as_str()).unwrap_or("");
        let failed_result = event_type == "result"
            && obj.get("is_error").and_then(|b| b.as_bool()) == Some(true);

        let message = if event_type == "error" || obj.contains_key("error") {
            match obj.get("error") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(body) => body
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| "The agent reported an error.".to_string()),
                None => "The agent reported an error.".to_string(),
            }
        } else if failed_result {
            obj.get("result")
                .or_else(|| obj.get("subtype"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| "The agent reported a failed result.".to_string())
        } else {
            return None;
        };

        let err = match registry::error_table_for(AGENT_ID).matches(&message) {
            Some(m) => AgentError::from_match(AGENT_ID, m, trimmed),
            // A detected structured error is never swallowed.
            None => AgentError::unknown(AGENT_ID, message, trimmed),
        };
        Some(err.with_payload(value))
    }
}

fn translate(line: &ClaudeLine) -> Option<EventKind> {
    match line.event_type.as_str() {
        "system" => match line.subtype.as_deref() {
            Some("init") => Some(EventKind::Init),
            other => Some(EventKind::System {
                message: other.unwrap_or("system").to_string(),
                usage: None,
            }),
        },

        "assistant" => {
            let message = line.message.as_ref()?;

            // One event per line: a tool call outranks narration.
            if let Some(block) = message.content.iter().find(|b| b.block_type == "tool_use") {
                return Some(EventKind::ToolUse {
                    name: block.name.clone().unwrap_or_else(|| "Unknown".to_string()),
                    status: ToolStatus::Started,
                });
            }

            let text = message
                .content
                .iter()
                .filter(|b| b.block_type == "text")
                .filter_map(|b| b.text.as_deref())
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            if text.is_empty() {
                None
            } else {
                Some(EventKind::Text {
                    text,
                    is_partial: false,
                })
            }
        }

        "content_block_delta" => {
            let text = line.delta.as_ref()?.text.clone()?;
            Some(EventKind::Text {
                text,
                is_partial: true,
            })
        }

        "result" => {
            if line.is_error == Some(true) {
                let message = line
                    .result
                    .clone()
                    .or_else(|| line.subtype.clone())
                    .unwrap_or_else(|| "The agent reported a failed result.".to_string());
                return Some(EventKind::Error { message });
            }
            Some(EventKind::Result {
                text: line.result.clone(),
                usage: decode_usage(line),
            })
        }

        "error" => Some(EventKind::Error {
            message: line
                .error
                .as_ref()
                .and_then(|e| e.message.clone())
                .unwrap_or_else(|| "The agent reported an error.".to_string()),
        }),

        // Tool-result echoes ("user") and unrecognized types produce nothing.
        _ => None,
    }
}

fn decode_usage(line: &ClaudeLine) -> Option<Usage> {
    let mut legacy = line.usage.clone();
    if let Some(cost) = line.total_cost_usd {
        legacy.get_or_insert_with(Usage::default).cost_usd = cost;
    }
    match &line.model_usage {
        Some(models) if !models.is_empty() => Some(aggregate_usage(models, legacy.as_ref())),
        _ => legacy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;

    fn parse(line: &str) -> Option<AgentEvent> {
        ClaudeParser::new().parse_line(line)
    }

    mod parse_line {
        use super::*;

        #[test]
        fn empty_line_yields_nothing() {
            assert!(parse("").is_none());
            assert!(parse("   ").is_none());
        }

        #[test]
        fn non_json_degrades_to_raw_text() {
            let event = parse("Compiling steward-core v0.1.0").unwrap();
            match event.kind {
                EventKind::Text { text, is_partial } => {
                    assert_eq!(text, "Compiling steward-core v0.1.0");
                    assert!(!is_partial);
                }
                _ => panic!("Expected Text event"),
            }
        }

        #[test]
        fn json_outside_the_schema_degrades_to_raw_text() {
            let event = parse(r#"[1, 2, 3]"#).unwrap();
            assert!(matches!(event.kind, EventKind::Text { .. }));
        }

        #[test]
        fn init_line_becomes_init_with_session() {
            let event =
                parse(r#"{"type":"system","subtype":"init","session_id":"sess-1"}"#).unwrap();
            assert!(matches!(event.kind, EventKind::Init));
            assert_eq!(event.session_id.as_deref(), Some("sess-1"));
        }

        #[test]
        fn other_system_subtypes_become_system_events() {
            let event = parse(r#"{"type":"system","subtype":"compact_boundary"}"#).unwrap();
            match event.kind {
                EventKind::System { message, .. } => assert_eq!(message, "compact_boundary"),
                _ => panic!("Expected System event"),
            }
        }

        #[test]
        fn assistant_text_blocks_join_into_one_event() {
            let line = r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"First"},{"type":"text","text":"Second"}]}}"#;
            let event = parse(line).unwrap();
            match event.kind {
                EventKind::Text { text, is_partial } => {
                    assert_eq!(text, "First\nSecond");
                    assert!(!is_partial);
                }
                _ => panic!("Expected Text event"),
            }
        }

        #[test]
        fn assistant_tool_use_outranks_text() {
            let line = r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Editing now"},{"type":"tool_use","name":"Edit","input":{}}]}}"#;
            let event = parse(line).unwrap();
            match event.kind {
                EventKind::ToolUse { name, status } => {
                    assert_eq!(name, "Edit");
                    assert_eq!(status, ToolStatus::Started);
                }
                _ => panic!("Expected ToolUse event"),
            }
        }

        #[test]
        fn assistant_with_empty_content_yields_nothing() {
            let line = r#"{"type":"assistant","message":{"role":"assistant","content":[]}}"#;
            assert!(parse(line).is_none());
        }

        #[test]
        fn delta_becomes_partial_text() {
            let line = r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"strea"}}"#;
            let event = parse(line).unwrap();
            match event.kind {
                EventKind::Text { text, is_partial } => {
                    assert_eq!(text, "strea");
                    assert!(is_partial);
                }
                _ => panic!("Expected Text event"),
            }
        }

        #[test]
        fn result_carries_aggregated_usage() {
            let line = r#"{
                "type": "result",
                "subtype": "success",
                "result": "Done.",
                "usage": {"input_tokens": 100, "output_tokens": 20},
                "modelUsage": {
                    "router": {"inputTokens": 200, "outputTokens": 10, "contextWindow": 200000},
                    "main": {"inputTokens": 1800, "outputTokens": 400, "contextWindow": 1000000}
                },
                "total_cost_usd": 0.25
            }"#;
            let event = parse(line).unwrap();
            assert!(event.is_final_result());
            let usage = event.usage().unwrap();
            assert_eq!(usage.input_tokens, 2000);
            assert_eq!(usage.output_tokens, 410);
            assert_eq!(usage.context_window, 1_000_000);
            assert!((usage.cost_usd - 0.25).abs() < 1e-9);
        }

        #[test]
        fn result_with_zero_model_usage_falls_back_to_flat() {
            let line = r#"{
                "type": "result",
                "result": "Done.",
                "usage": {"input_tokens": 500, "output_tokens": 80},
                "modelUsage": {"main": {"inputTokens": 0, "outputTokens": 0}}
            }"#;
            let usage = parse(line).unwrap().usage().unwrap().clone();
            assert_eq!(usage.input_tokens, 500);
            assert_eq!(usage.output_tokens, 80);
        }

        #[test]
        fn result_without_usage_has_none() {
            let event = parse(r#"{"type":"result","result":"ok"}"#).unwrap();
            assert!(event.is_final_result());
            assert!(event.usage().is_none());
        }

        #[test]
        fn error_result_becomes_error_event() {
            let event =
                parse(r#"{"type":"result","subtype":"error_during_execution","is_error":true}"#)
                    .unwrap();
            match event.kind {
                EventKind::Error { message } => assert_eq!(message, "error_during_execution"),
                _ => panic!("Expected Error event"),
            }
        }

        #[test]
        fn tool_result_echo_yields_nothing() {
            let line = r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","text":"ok"}]}}"#;
            assert!(parse(line).is_none());
        }

        #[test]
        fn raw_payload_is_attached() {
            let event = parse(r#"{"type":"system","subtype":"init"}"#).unwrap();
            let raw = event.raw.unwrap();
            assert_eq!(raw["subtype"], "init");
        }
    }

    // These read the global pattern registry; `parallel` keeps them from
    // overlapping the registry tests that clear it.
    mod detect_error_from_line {
        use super::*;
        use serial_test::parallel;

        fn detect(line: &str) -> Option<AgentError> {
            ClaudeParser::new().detect_error_from_line(line)
        }

        #[test]
        #[parallel]
        fn prose_is_never_inspected() {
            assert!(detect("I could not connect to the database").is_none());
        }

        #[test]
        #[parallel]
        fn json_prose_without_error_shape_is_ignored() {
            // Decodable JSON, error-sounding words, but not error-shaped.
            let line = r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"rate limit exceeded is what the log said"}]}}"#;
            assert!(detect(line).is_none());
        }

        #[test]
        #[parallel]
        fn structured_error_is_classified() {
            let line = r#"{"type":"error","error":{"message":"Claude usage limit reached"}}"#;
            let err = detect(line).unwrap();
            assert_eq!(err.category, ErrorCategory::TokenExhaustion);
            assert!(!err.recoverable);
            assert_eq!(err.agent_id, AGENT_ID);
            assert!(err.source_payload.is_some());
        }

        #[test]
        #[parallel]
        fn error_member_alone_is_error_shaped() {
            let line = r#"{"type":"stream_event","error":"connection reset by peer"}"#;
            let err = detect(line).unwrap();
            assert_eq!(err.category, ErrorCategory::NetworkError);
        }

        #[test]
        #[parallel]
        fn failed_result_is_error_shaped() {
            let line = r#"{"type":"result","is_error":true,"result":"Rate limit exceeded, retry shortly"}"#;
            let err = detect(line).unwrap();
            assert_eq!(err.category, ErrorCategory::RateLimited);
            assert!(err.recoverable);
        }

        #[test]
        #[parallel]
        fn unmatched_structured_error_degrades_to_unknown_not_none() {
            let line = r#"{"type":"error","error":{"message":"flux capacitor misaligned"}}"#;
            let err = detect(line).unwrap();
            assert_eq!(err.category, ErrorCategory::Unknown);
            assert!(err.recoverable);
            assert_eq!(err.message, "flux capacitor misaligned");
        }
    }
}
