//! Gemini-family NDJSON types.
//!
//! Every line is an envelope with an `event` discriminator and a `data`
//! payload:
//!
//! ```json
//! {"event":"init","data":{"session":"g-123"},"ts":"2026-02-04T10:00:00Z"}
//! {"event":"content","data":{"text":"Hel","delta":true}}
//! {"event":"tool","data":{"name":"read_file","phase":"start"}}
//! {"event":"finish","data":{"reason":"stop","stats":{"prompt_tokens":900,"candidates_tokens":150,"cached_tokens":400,"cost":0.002}}}
//! {"event":"fault","data":{"detail":"429 RESOURCE_EXHAUSTED: quota exceeded"}}
//! ```

use serde::Deserialize;

/// One decoded envelope line of gemini-family output.
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiLine {
    pub event: String,

    #[serde(default)]
    pub data: Option<GeminiData>,

    #[serde(default)]
    pub ts: Option<String>,
}

/// Envelope payload; which fields are set depends on the event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeminiData {
    /// Session identifier, on `init`.
    #[serde(default)]
    pub session: Option<String>,

    /// Message text, on `content` and `notice`.
    #[serde(default)]
    pub text: Option<String>,

    /// True when `text` is a streaming fragment.
    #[serde(default)]
    pub delta: Option<bool>,

    /// Tool name, on `tool`.
    #[serde(default)]
    pub name: Option<String>,

    /// Tool phase: `start`, `end`, or `fail`.
    #[serde(default)]
    pub phase: Option<String>,

    /// Finish reason, on `finish`.
    #[serde(default)]
    pub reason: Option<String>,

    /// Human-readable failure text, on `fault`.
    #[serde(default)]
    pub detail: Option<String>,

    /// Token statistics, on `finish`.
    #[serde(default)]
    pub stats: Option<GeminiStats>,
}

/// Flat token statistics on `finish` events.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeminiStats {
    #[serde(default)]
    pub prompt_tokens: u64,

    #[serde(default)]
    pub candidates_tokens: u64,

    #[serde(default)]
    pub cached_tokens: u64,

    #[serde(default)]
    pub cost: f64,
}
