//! Codex-family protocol support.
//!
//! This family speaks JSON-RPC 2.0 over stdio rather than a bespoke
//! streaming schema; the parser handles notifications and surfaces
//! server-initiated requests as informational events.

mod parser;
pub mod spawn;
mod types;

pub use parser::CodexParser;
pub use spawn::CodexConfig;
pub use types::*;

use crate::errors::{pattern, ErrorCategory, PatternTable};

/// Registry key for this family.
pub const AGENT_ID: &str = "codex";

/// Default error phrasing for the codex family.
///
/// Quota problems arrive as `insufficient_quota`-style API error codes,
/// and auth problems as bare HTTP 401 text.
pub(crate) fn error_patterns() -> PatternTable {
    let mut t = PatternTable::new();

    t.push(
        ErrorCategory::AuthExpired,
        pattern(
            r"401 unauthorized",
            "Authentication was rejected. Sign in again to continue.",
            true,
        ),
    );
    t.push(
        ErrorCategory::AuthExpired,
        pattern(
            r"token (has )?expired",
            "Your sign-in has expired. Sign in again to continue.",
            true,
        ),
    );
    t.push(
        ErrorCategory::AuthExpired,
        pattern(
            r"not logged in",
            "The agent is signed out. Sign in again to continue.",
            true,
        ),
    );

    t.push(
        ErrorCategory::TokenExhaustion,
        pattern(
            r"insufficient_quota",
            "The account has no remaining quota for this model.",
            false,
        ),
    );
    t.push(
        ErrorCategory::TokenExhaustion,
        pattern(
            r"quota exceeded",
            "The account's usage quota has been exceeded.",
            false,
        ),
    );
    t.push(
        ErrorCategory::TokenExhaustion,
        pattern(
            r"billing (hard )?limit",
            "The account's billing limit has been reached.",
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
            r"(status|http) 429",
            "The model service returned HTTP 429. Wait a moment and try again.",
            true,
        ),
    );

    t.push(
        ErrorCategory::NetworkError,
        pattern(
            r"connection (refused|reset|failed)",
            "Could not reach the model service. Check your network connection and try again.",
            true,
        ),
    );
    t.push(
        ErrorCategory::NetworkError,
        pattern(
            r"tls handshake",
            "A secure connection to the model service could not be established.",
            true,
        ),
    );
    t.push(
        ErrorCategory::NetworkError,
        pattern(
            r"stream disconnected",
            "The response stream was interrupted. Try again.",
            true,
        ),
    );
    t.push(
        ErrorCategory::NetworkError,
        pattern(
            r"dns (lookup )?(error|failure|failed)",
            "The model service's hostname could not be resolved. Check your network.",
            true,
        ),
    );

    t.push(
        ErrorCategory::PermissionDenied,
        pattern(
            r"permission denied",
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
        ErrorCategory::PermissionDenied,
        pattern(
            r"sandbox (denied|violation)",
            "The sandbox blocked an operation the agent attempted.",
            false,
        ),
    );

    t.push(
        ErrorCategory::AgentCrashed,
        pattern(
            r"panicked at",
            "The agent process crashed unexpectedly.",
            false,
        ),
    );
    t.push(
        ErrorCategory::AgentCrashed,
        pattern(
            r"core dumped",
            "The agent process crashed unexpectedly.",
            false,
        ),
    );

    t
}
