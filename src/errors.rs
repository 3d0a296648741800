//! Failure taxonomy, per-agent pattern tables, and the line classifier.
//!
//! Every failure an agent surfaces - in-stream, via stderr, or through its
//! exit code - is mapped onto a small closed vocabulary of categories that
//! downstream consumers render as icons and copy. Patterns carry their own
//! pre-written user message and a recoverability flag fixed at authoring
//! time, so classification never has to invent either.

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Closed, wire-stable failure vocabulary.
///
/// The serialized names are part of the external contract - adding a
/// variant is a breaking change for consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    AuthExpired,
    TokenExhaustion,
    RateLimited,
    NetworkError,
    PermissionDenied,
    AgentCrashed,
    Unknown,
}

impl ErrorCategory {
    /// Fixed evaluation order for classification. [`ErrorCategory::Unknown`]
    /// is the reserved fallback and is never pattern-matched.
    pub const ORDERED: [ErrorCategory; 6] = [
        ErrorCategory::AuthExpired,
        ErrorCategory::TokenExhaustion,
        ErrorCategory::RateLimited,
        ErrorCategory::NetworkError,
        ErrorCategory::PermissionDenied,
        ErrorCategory::AgentCrashed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::AuthExpired => "auth_expired",
            ErrorCategory::TokenExhaustion => "token_exhaustion",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::PermissionDenied => "permission_denied",
            ErrorCategory::AgentCrashed => "agent_crashed",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rule mapping raw agent text to a category.
///
/// Matching is case-insensitive substring/regex matching. Patterns are
/// written to require operational phrasing ("connection refused", not bare
/// "connection") so that an agent merely *talking about* errors never
/// classifies as one.
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    matcher: Regex,
    source: String,
    pub user_message: String,
    pub recoverable: bool,
}

impl ErrorPattern {
    pub fn new(
        pattern: &str,
        user_message: impl Into<String>,
        recoverable: bool,
    ) -> Result<Self, regex::Error> {
        let matcher = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            matcher,
            source: pattern.to_string(),
            user_message: user_message.into(),
            recoverable,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }

    /// The pattern string this rule was built from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl PartialEq for ErrorPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.user_message == other.user_message
            && self.recoverable == other.recoverable
    }
}

/// Successful classification outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub category: ErrorCategory,
    pub message: String,
    pub recoverable: bool,
}

/// Ordered per-category rule set for one agent family.
///
/// Categories are always evaluated in [`ErrorCategory::ORDERED`] order;
/// within a category, patterns are evaluated in the order they were
/// pushed. The first match wins on both axes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternTable {
    groups: [Vec<ErrorPattern>; 6],
}

impl PatternTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pattern to a category's group, preserving declaration order.
    pub fn push(&mut self, category: ErrorCategory, pattern: ErrorPattern) {
        match Self::slot(category) {
            Some(slot) => self.groups[slot].push(pattern),
            None => log::warn!("ignoring pattern registered under the reserved 'unknown' category"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.is_empty())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.len()).sum()
    }

    /// Classify a piece of agent text.
    ///
    /// Returns `None` for empty input, an empty table, or text no pattern
    /// matches - absence of a match is "no error detected", never a failure.
    pub fn matches(&self, text: &str) -> Option<PatternMatch> {
        if text.is_empty() {
            return None;
        }
        for (slot, category) in ErrorCategory::ORDERED.iter().enumerate() {
            for pattern in &self.groups[slot] {
                if pattern.is_match(text) {
                    return Some(PatternMatch {
                        category: *category,
                        message: pattern.user_message.clone(),
                        recoverable: pattern.recoverable,
                    });
                }
            }
        }
        None
    }

    fn slot(category: ErrorCategory) -> Option<usize> {
        ErrorCategory::ORDERED.iter().position(|c| *c == category)
    }
}

/// Authoring-time pattern constructor for the built-in tables.
///
/// Panics on an invalid pattern, which the default-table tests catch at
/// build time.
pub(crate) fn pattern(re: &str, user_message: &str, recoverable: bool) -> ErrorPattern {
    ErrorPattern::new(re, user_message, recoverable).expect("built-in pattern must compile")
}

/// A classified failure attributed to one agent session.
///
/// Immutable once constructed. `recoverable` is advisory metadata for the
/// caller - nothing in this crate retries. The `message` is the
/// pre-written human-readable text chosen at pattern-authoring time; the
/// raw line/stderr that triggered it rides along in `raw_context` and is
/// never substituted for the display message.
#[derive(Debug, Clone, Serialize)]
pub struct AgentError {
    pub category: ErrorCategory,
    pub message: String,
    pub recoverable: bool,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub raw_context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_payload: Option<serde_json::Value>,
}

impl AgentError {
    pub fn from_match(
        agent_id: impl Into<String>,
        m: PatternMatch,
        raw_context: impl Into<String>,
    ) -> Self {
        Self {
            category: m.category,
            message: m.message,
            recoverable: m.recoverable,
            agent_id: agent_id.into(),
            timestamp: Utc::now(),
            raw_context: raw_context.into(),
            source_payload: None,
        }
    }

    /// A structured error no pattern recognized. Recoverable by default -
    /// the caller decides, not us.
    pub fn unknown(
        agent_id: impl Into<String>,
        message: impl Into<String>,
        raw_context: impl Into<String>,
    ) -> Self {
        Self {
            category: ErrorCategory::Unknown,
            message: message.into(),
            recoverable: true,
            agent_id: agent_id.into(),
            timestamp: Utc::now(),
            raw_context: raw_context.into(),
            source_payload: None,
        }
    }

    pub fn crashed(
        agent_id: impl Into<String>,
        message: impl Into<String>,
        raw_context: impl Into<String>,
    ) -> Self {
        Self {
            category: ErrorCategory::AgentCrashed,
            message: message.into(),
            recoverable: false,
            agent_id: agent_id.into(),
            timestamp: Utc::now(),
            raw_context: raw_context.into(),
            source_payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.source_payload = Some(payload);
        self
    }
}
