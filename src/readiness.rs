//! Fallback extraction of structured readiness reports from free-form
//! agent responses.
//!
//! When an agent is asked to answer in the constrained
//! `{confidence, ready, message}` form, it usually does - but some
//! responses come back as prose, a fenced code block, or a JSON object
//! buried mid-sentence. This module tries progressively looser extraction
//! strategies and, failing all of them, synthesizes a conservative report
//! from textual cues.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Confidence at or above this is eligible for `ready = true`.
pub const READINESS_THRESHOLD: u8 = 80;

/// Confidence assumed when nothing in the text states one.
pub const FALLBACK_CONFIDENCE: u8 = 30;

/// Normalized readiness report. `confidence` is always an integer in
/// [0, 100], and `ready` is never true below [`READINESS_THRESHOLD`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub confidence: u8,
    pub ready: bool,
    pub message: String,
}

/// Pre-normalization shape shared by every extraction strategy.
///
/// Confidence is decoded as a float so out-of-range and fractional
/// values survive to the clamping step instead of failing to parse.
#[derive(Debug, Clone, Deserialize)]
struct RawReport {
    confidence: f64,
    ready: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Extract a readiness report from an agent response.
///
/// Strategies, first success wins:
/// 1. the whole input parses as the report;
/// 2. a fenced code block contains it;
/// 3. an embedded object carries both required fields;
/// 4. an embedded object carries at least one of them.
///
/// If all four fail, a report is synthesized from textual cues. The
/// normalization rules (clamping, rounding, forced-false coupling) are
/// applied uniformly afterwards, regardless of which strategy produced
/// the raw values.
pub fn extract(text: &str) -> ReadinessReport {
    let raw = parse_direct(text)
        .or_else(|| parse_fenced(text))
        .or_else(|| parse_embedded(text, true))
        .or_else(|| parse_embedded(text, false))
        .unwrap_or_else(|| synthesize(text));
    normalize(raw)
}

fn normalize(raw: RawReport) -> ReadinessReport {
    let confidence = raw.confidence.round().clamp(0.0, 100.0) as u8;
    // The threshold overrides even an explicit ready=true; at-threshold
    // values pass.
    let ready = raw.ready && confidence >= READINESS_THRESHOLD;
    ReadinessReport {
        confidence,
        ready,
        message: raw.message.unwrap_or_default(),
    }
}

fn parse_direct(text: &str) -> Option<RawReport> {
    serde_json::from_str(text.trim()).ok()
}

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid regex"));

fn parse_fenced(text: &str) -> Option<RawReport> {
    for caps in FENCED_BLOCK.captures_iter(text) {
        if let Ok(raw) = serde_json::from_str::<RawReport>(&caps[1]) {
            return Some(raw);
        }
    }
    None
}

/// Scan for balanced-brace object candidates in the text.
///
/// With `require_all`, a candidate must carry both `confidence` and
/// `ready`; otherwise one of the two suffices and the missing field is
/// defaulted conservatively.
fn parse_embedded(text: &str, require_all: bool) -> Option<RawReport> {
    for candidate in object_candidates(text) {
        let value: serde_json::Value = match serde_json::from_str(candidate) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let obj = match value.as_object() {
            Some(o) => o,
            None => continue,
        };

        let has_confidence = obj.contains_key("confidence");
        let has_ready = obj.contains_key("ready");
        if require_all && !(has_confidence && has_ready) {
            continue;
        }
        if !has_confidence && !has_ready {
            continue;
        }

        return Some(RawReport {
            confidence: obj
                .get("confidence")
                .and_then(|v| v.as_f64())
                .unwrap_or(f64::from(FALLBACK_CONFIDENCE)),
            ready: obj.get("ready").and_then(|v| v.as_bool()).unwrap_or(false),
            message: obj
                .get("message")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        });
    }
    None
}

/// Balanced-brace substrings of the text, outermost first per start point.
fn object_candidates(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut candidates = Vec::new();
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        candidates.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    candidates
}

static CONFIDENCE_STATED: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"confidence[:\s]+(\d{1,3})")
        .case_insensitive(true)
        .build()
        .expect("valid regex")
});
static CONFIDENCE_PERCENT: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"(\d{1,3})\s*%\s*confiden")
        .case_insensitive(true)
        .build()
        .expect("valid regex")
});
static AFFIRMATIVE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"ready to (proceed|create)|let'?s proceed")
        .case_insensitive(true)
        .build()
        .expect("valid regex")
});
static HEDGING: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"need more|clarif|question")
        .case_insensitive(true)
        .build()
        .expect("valid regex")
});

/// Last resort: read confidence and readiness straight out of the prose.
fn synthesize(text: &str) -> RawReport {
    let confidence = CONFIDENCE_STATED
        .captures(text)
        .or_else(|| CONFIDENCE_PERCENT.captures(text))
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .unwrap_or(f64::from(FALLBACK_CONFIDENCE));

    // Clarification-seeking language vetoes readiness no matter how
    // confident the text sounds.
    let ready = confidence >= f64::from(READINESS_THRESHOLD)
        && AFFIRMATIVE.is_match(text)
        && !HEDGING.is_match(text);

    RawReport {
        confidence,
        ready,
        message: Some(text.trim().to_string()),
    }
}
