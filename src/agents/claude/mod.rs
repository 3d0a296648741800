//! Claude-family protocol support.
//!
//! Parses the family's stream-json output format, carries its error
//! phrasing table, and builds its spawn configuration.

mod parser;
pub mod spawn;
mod types;

pub use parser::ClaudeParser;
pub use spawn::ClaudeConfig;
pub use types::*;

use crate::errors::{pattern, ErrorCategory, PatternTable};

/// Registry key for this family.
pub const AGENT_ID: &str = "claude";

/// Default error phrasing for the claude family.
///
/// This family reports quota exhaustion with "usage limit" wording and
/// authentication trouble by telling the user to run `/login`.
pub(crate) fn error_patterns() -> PatternTable {
    let mut t = PatternTable::new();

    t.push(
        ErrorCategory::AuthExpired,
        pattern(
            r"invalid api key",
            "Authentication failed: the API key is invalid or revoked. Sign in again to continue.",
            true,
        ),
    );
    t.push(
        ErrorCategory::AuthExpired,
        pattern(
            r"oauth token (has )?expired",
            "Your sign-in has expired. Sign in again to continue.",
            true,
        ),
    );
    t.push(
        ErrorCategory::AuthExpired,
        pattern(
            r"please run /login",
            "The agent is signed out. Sign in again to continue.",
            true,
        ),
    );
    t.push(
        ErrorCategory::AuthExpired,
        pattern(
            r"authentication[_ ]error",
            "Authentication failed. Sign in again to continue.",
            true,
        ),
    );

    t.push(
        ErrorCategory::TokenExhaustion,
        pattern(
            r"usage limit reached",
            "The usage limit for this plan has been reached. The limit resets on a schedule set by the provider.",
            false,
        ),
    );
    t.push(
        ErrorCategory::TokenExhaustion,
        pattern(
            r"out of extra usage",
            "Extra usage credits are exhausted for this billing period.",
            false,
        ),
    );
    t.push(
        ErrorCategory::TokenExhaustion,
        pattern(
            r"credit balance is too low",
            "The account's credit balance is too low to continue.",
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
            r"overloaded_error",
            "The model is temporarily overloaded. Wait a moment and try again.",
            true,
        ),
    );

    t.push(
        ErrorCategory::NetworkError,
        pattern(
            r"connection (failed|refused|reset|closed)",
            "Could not reach the model service. Check your network connection and try again.",
            true,
        ),
    );
    t.push(
        ErrorCategory::NetworkError,
        pattern(
            r"network (error|failure)",
            "A network error interrupted the agent. Check your connection and try again.",
            true,
        ),
    );
    t.push(
        ErrorCategory::NetworkError,
        pattern(
            r"fetch failed",
            "A network request from the agent failed. Check your connection and try again.",
            true,
        ),
    );
    t.push(
        ErrorCategory::NetworkError,
        pattern(
            r"request timed out",
            "A request to the model service timed out. Try again.",
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
            r"operation not permitted",
            "The operating system blocked an operation the agent attempted.",
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
            r"segmentation fault",
            "The agent process crashed unexpectedly.",
            false,
        ),
    );
    t.push(
        ErrorCategory::AgentCrashed,
        pattern(
            r"fatal error:",
            "The agent hit a fatal internal error and stopped.",
            false,
        ),
    );

    t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversational_text_never_matches() {
        let table = error_patterns();
        for line in [
            "I will establish a connection to the database next.",
            "the timeout value is 30",
            "Let me look at the rate limiting middleware you wrote.",
            "This function handles permission checks for admins.",
            "The usage limits are configured in settings.toml.",
        ] {
            assert!(table.matches(line).is_none(), "false positive on: {line}");
        }
    }

    #[test]
    fn operational_phrasing_matches_expected_categories() {
        let table = error_patterns();
        let cases = [
            ("Claude AI usage limit reached|1759302000", ErrorCategory::TokenExhaustion),
            ("rate limit exceeded, retrying in 20s", ErrorCategory::RateLimited),
            ("fetch failed: connection refused", ErrorCategory::NetworkError),
            ("EACCES: permission denied, open '/etc/hosts'", ErrorCategory::PermissionDenied),
            ("OAuth token has expired. Please run /login", ErrorCategory::AuthExpired),
            ("thread 'main' panicked at src/main.rs:10", ErrorCategory::AgentCrashed),
        ];
        for (line, expected) in cases {
            let m = table.matches(line).unwrap_or_else(|| panic!("no match for: {line}"));
            assert_eq!(m.category, expected, "wrong category for: {line}");
        }
    }

    #[test]
    fn matching_ignores_case() {
        let table = error_patterns();
        assert_eq!(
            table.matches("RATE LIMIT EXCEEDED").unwrap().category,
            ErrorCategory::RateLimited
        );
        assert_eq!(
            table.matches("Usage Limit Reached").unwrap().category,
            ErrorCategory::TokenExhaustion
        );
    }

    #[test]
    fn auth_precedes_token_exhaustion_in_evaluation_order() {
        // A line mentioning both an expired token and quota resolves to
        // the earlier category.
        let table = error_patterns();
        let m = table
            .matches("oauth token expired; also usage limit reached")
            .unwrap();
        assert_eq!(m.category, ErrorCategory::AuthExpired);
    }
}
