//! Gemini-family stream parser.

use crate::agents::event::{AgentEvent, EventKind, ToolStatus};
use crate::errors::AgentError;
use crate::registry;
use crate::usage::Usage;

use super::types::{GeminiData, GeminiLine};
use super::AGENT_ID;

/// Stateless line parser for the gemini family.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiParser;

impl GeminiParser {
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
        let parsed: GeminiLine = match serde_json::from_value(value.clone()) {
            Ok(p) => p,
            Err(_) => return Some(AgentEvent::raw_text(line)),
        };

        let session_id = parsed.data.as_ref().and_then(|d| d.session.clone());
        let kind = translate(&parsed)?;
        Some(AgentEvent::new(kind).with_session(session_id).with_raw(value))
    }

    /// Detect a structured in-stream error.
    ///
    /// Error-shaped input for this family is a `fault` envelope; any other
    /// event - however error-sounding its text - is left alone.
    pub fn detect_error_from_line(&self, line: &str) -> Option<AgentError> {
        let trimmed = line.trim();
        let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        value.as_object()?;
        let parsed: GeminiLine = serde_json::from_value(value.clone()).ok()?;
        if parsed.event != "fault" {
            return None;
        }

        let message = parsed
            .data
            .as_ref()
            .and_then(|d| d.detail.clone())
            .unwrap_or_else(|| "The agent reported a fault.".to_string());

        let err = match registry::error_table_for(AGENT_ID).matches(&message) {
            Some(m) => AgentError::from_match(AGENT_ID, m, trimmed),
            None => AgentError::unknown(AGENT_ID, message, trimmed),
        };
        Some(err.with_payload(value))
    }
}

fn translate(line: &GeminiLine) -> Option<EventKind> {
    let data = line.data.clone().unwrap_or_default();
    match line.event.as_str() {
        "init" => Some(EventKind::Init),

        "content" => {
            let text = data.text?;
            if text.is_empty() {
                return None;
            }
            Some(EventKind::Text {
                text,
                is_partial: data.delta.unwrap_or(false),
            })
        }

        "tool" => Some(EventKind::ToolUse {
            name: data.name.unwrap_or_else(|| "unknown".to_string()),
            status: match data.phase.as_deref() {
                Some("end") => ToolStatus::Completed,
                Some("fail") => ToolStatus::Failed,
                _ => ToolStatus::Started,
            },
        }),

        "finish" => Some(EventKind::Result {
            text: data.reason.clone(),
            usage: data.stats.as_ref().map(|s| Usage {
                input_tokens: s.prompt_tokens,
                output_tokens: s.candidates_tokens,
                cache_read_tokens: s.cached_tokens,
                cost_usd: s.cost,
                ..Usage::default()
            }),
        }),

        "notice" => Some(EventKind::System {
            message: notice_text(&data),
            usage: None,
        }),

        "fault" => Some(EventKind::Error {
            message: data
                .detail
                .unwrap_or_else(|| "The agent reported a fault.".to_string()),
        }),

        _ => None,
    }
}

fn notice_text(data: &GeminiData) -> String {
    data.text
        .clone()
        .or_else(|| data.detail.clone())
        .unwrap_or_else(|| "notice".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;

    fn parse(line: &str) -> Option<AgentEvent> {
        GeminiParser::new().parse_line(line)
    }

    mod parse_line {
        use super::*;

        #[test]
        fn non_json_degrades_to_raw_text() {
            let event = parse("Loaded cached credentials.").unwrap();
            match event.kind {
                EventKind::Text { text, .. } => assert_eq!(text, "Loaded cached credentials."),
                _ => panic!("Expected Text event"),
            }
        }

        #[test]
        fn init_carries_session() {
            let event = parse(r#"{"event":"init","data":{"session":"g-42"}}"#).unwrap();
            assert!(matches!(event.kind, EventKind::Init));
            assert_eq!(event.session_id.as_deref(), Some("g-42"));
        }

        #[test]
        fn content_delta_is_partial() {
            let event = parse(r#"{"event":"content","data":{"text":"Hel","delta":true}}"#).unwrap();
            assert!(matches!(
                event.kind,
                EventKind::Text {
                    is_partial: true,
                    ..
                }
            ));
        }

        #[test]
        fn content_without_delta_flag_is_final() {
            let event = parse(r#"{"event":"content","data":{"text":"Done."}}"#).unwrap();
            match event.kind {
                EventKind::Text { text, is_partial } => {
                    assert_eq!(text, "Done.");
                    assert!(!is_partial);
                }
                _ => panic!("Expected Text event"),
            }
        }

        #[test]
        fn tool_phases_map_to_statuses() {
            let start = parse(r#"{"event":"tool","data":{"name":"read_file","phase":"start"}}"#)
                .unwrap();
            assert!(matches!(
                start.kind,
                EventKind::ToolUse {
                    status: ToolStatus::Started,
                    ..
                }
            ));

            let end =
                parse(r#"{"event":"tool","data":{"name":"read_file","phase":"end"}}"#).unwrap();
            assert!(matches!(
                end.kind,
                EventKind::ToolUse {
                    status: ToolStatus::Completed,
                    ..
                }
            ));

            let fail =
                parse(r#"{"event":"tool","data":{"name":"read_file","phase":"fail"}}"#).unwrap();
            assert!(matches!(
                fail.kind,
                EventKind::ToolUse {
                    status: ToolStatus::Failed,
                    ..
                }
            ));
        }

        #[test]
        fn finish_maps_stats_to_usage() {
            let line = r#"{"event":"finish","data":{"reason":"stop","stats":{"prompt_tokens":900,"candidates_tokens":150,"cached_tokens":400,"cost":0.002}}}"#;
            let event = parse(line).unwrap();
            assert!(event.is_final_result());
            let usage = event.usage().unwrap();
            assert_eq!(usage.input_tokens, 900);
            assert_eq!(usage.output_tokens, 150);
            assert_eq!(usage.cache_read_tokens, 400);
            assert!((usage.cost_usd - 0.002).abs() < 1e-9);
        }

        #[test]
        fn notice_becomes_system() {
            let event =
                parse(r#"{"event":"notice","data":{"text":"retrying after backoff"}}"#).unwrap();
            match event.kind {
                EventKind::System { message, .. } => assert_eq!(message, "retrying after backoff"),
                _ => panic!("Expected System event"),
            }
        }

        #[test]
        fn unknown_event_produces_nothing() {
            assert!(parse(r#"{"event":"heartbeat"}"#).is_none());
        }
    }

    // These read the global pattern registry; `parallel` keeps them from
    // overlapping the registry tests that clear it.
    mod detect_error_from_line {
        use super::*;
        use serial_test::parallel;

        fn detect(line: &str) -> Option<AgentError> {
            GeminiParser::new().detect_error_from_line(line)
        }

        #[test]
        #[parallel]
        fn content_is_never_inspected() {
            let line = r#"{"event":"content","data":{"text":"quota exceeded is mentioned in this doc"}}"#;
            assert!(detect(line).is_none());
        }

        #[test]
        #[parallel]
        fn fault_with_status_code_is_classified() {
            let line = r#"{"event":"fault","data":{"detail":"403 Forbidden: caller lacks IAM role"}}"#;
            let err = detect(line).unwrap();
            assert_eq!(err.category, ErrorCategory::PermissionDenied);
            assert!(!err.recoverable);
        }

        #[test]
        #[parallel]
        fn resource_exhausted_maps_to_token_exhaustion_before_429() {
            // The fault mentions both the gRPC status and the HTTP code;
            // category order resolves the tie toward token_exhaustion.
            let line = r#"{"event":"fault","data":{"detail":"429 RESOURCE_EXHAUSTED: quota exceeded"}}"#;
            let err = detect(line).unwrap();
            assert_eq!(err.category, ErrorCategory::TokenExhaustion);
        }

        #[test]
        #[parallel]
        fn unmatched_fault_degrades_to_unknown() {
            let line = r#"{"event":"fault","data":{"detail":"model returned malformed candidates"}}"#;
            let err = detect(line).unwrap();
            assert_eq!(err.category, ErrorCategory::Unknown);
            assert!(err.recoverable);
        }
    }
}
