//! Gemini-family protocol support.
//!
//! A one-shot CLI: a new process per message, session continuity via a
//! resume flag, NDJSON envelope output, no interactive approvals.

mod parser;
pub mod spawn;
mod types;

pub use parser::GeminiParser;
pub use spawn::GeminiConfig;
pub use types::*;

use crate::errors::{pattern, ErrorCategory, PatternTable};

/// Registry key for this family.
pub const AGENT_ID: &str = "gemini";

/// Default error phrasing for the gemini family.
///
/// This family embeds HTTP status codes and gRPC status names directly in
/// its error text, so the patterns key on those rather than prose.
pub(crate) fn error_patterns() -> PatternTable {
    let mut t = PatternTable::new();

    t.push(
        ErrorCategory::AuthExpired,
        pattern(
            r"api key not valid",
            "The API key is invalid or revoked. Re-authenticate and try again.",
            true,
        ),
    );
    t.push(
        ErrorCategory::AuthExpired,
        pattern(
            r"unauthenticated",
            "Authentication failed. Sign in again to continue.",
            true,
        ),
    );
    t.push(
        ErrorCategory::AuthExpired,
        pattern(
            r"credentials .*expired",
            "Your credentials have expired. Sign in again to continue.",
            true,
        ),
    );

    t.push(
        ErrorCategory::TokenExhaustion,
        pattern(
            r"resource_exhausted",
            "The project's token quota is exhausted.",
            false,
        ),
    );
    t.push(
        ErrorCategory::TokenExhaustion,
        pattern(
            r"quota exceeded",
            "The project's usage quota has been exceeded.",
            false,
        ),
    );
    t.push(
        ErrorCategory::TokenExhaustion,
        pattern(
            r"daily limit reached",
            "The daily request limit has been reached.",
            false,
        ),
    );

    t.push(
        ErrorCategory::RateLimited,
        pattern(
            r"rate limit(ed)?\b",
            "The agent is being rate limited. Wait a moment and try again.",
            true,
        ),
    );
    t.push(
        ErrorCategory::RateLimited,
        pattern(
            r"too many requests",
            "Too many requests in a short window. Wait a moment and try again.",
            true,
        ),
    );
    t.push(
        ErrorCategory::RateLimited,
        pattern(
            r"(status|http|code)[: ]*429",
            "The model service returned HTTP 429. Wait a moment and try again.",
            true,
        ),
    );

    t.push(
        ErrorCategory::NetworkError,
        pattern(
            r"service unavailable",
            "The model service is temporarily unavailable. Try again shortly.",
            true,
        ),
    );
    t.push(
        ErrorCategory::NetworkError,
        pattern(
            r"connection (refused|reset)",
            "Could not reach the model service. Check your network connection and try again.",
            true,
        ),
    );
    t.push(
        ErrorCategory::NetworkError,
        pattern(
            r"network is unreachable",
            "The network is unreachable. Check your connection and try again.",
            true,
        ),
    );
    t.push(
        ErrorCategory::NetworkError,
        pattern(
            r"deadline exceeded",
            "A request to the model service timed out. Try again.",
            true,
        ),
    );

    t.push(
        ErrorCategory::PermissionDenied,
        pattern(
            r"permission[ _]denied",
            "The agent was denied access to a file or resource it needs.",
            false,
        ),
    );
    t.push(
        ErrorCategory::PermissionDenied,
        pattern(
            r"403 forbidden",
            "The model service refused the request (HTTP 403).",
            false,
        ),
    );

    t.push(
        ErrorCategory::AgentCrashed,
        pattern(
            r"fatal error",
            "The agent hit a fatal internal error and stopped.",
            false,
        ),
    );
    t.push(
        ErrorCategory::AgentCrashed,
        pattern(
            r"unhandled (exception|rejection)",
            "The agent process crashed unexpectedly.",
            false,
        ),
    );

    t
}
