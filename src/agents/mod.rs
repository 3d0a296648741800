//! Agent family implementations and the shared parser contract.
//!
//! Each supported family decodes a different wire schema, but all of them
//! honor the same control contract: `parse_line` never fails, structured
//! errors are never swallowed, and exit failures are never reported as
//! nothing. That shared contract is what keeps the supervisor
//! agent-agnostic.

pub mod claude;
pub mod codex;
pub mod event;
pub mod gemini;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::errors::AgentError;
use crate::registry;
use crate::spawn::SpawnConfig;
use crate::usage::Usage;
use event::AgentEvent;

/// Everything needed to launch one agent process, independent of family.
#[derive(Debug, Clone, Default)]
pub struct LaunchSpec {
    pub binary_path: String,
    pub working_dir: String,
    pub prompt: String,
    pub model: Option<String>,
    pub resume_session: Option<String>,
    pub shell_prefix: Option<String>,
}

/// Closed set of output parsers, one variant per supported agent family.
///
/// Deliberately an enum rather than a trait object: adding a fourth
/// family means adding one variant here and one registry entry, and the
/// compiler walks every dispatch site.
#[derive(Debug, Clone, Copy)]
pub enum AgentParser {
    Claude(claude::ClaudeParser),
    Codex(codex::CodexParser),
    Gemini(gemini::GeminiParser),
}

impl AgentParser {
    /// The registry key this parser is installed under by default.
    pub fn agent_id(&self) -> &'static str {
        match self {
            AgentParser::Claude(_) => claude::AGENT_ID,
            AgentParser::Codex(_) => codex::AGENT_ID,
            AgentParser::Gemini(_) => gemini::AGENT_ID,
        }
    }

    /// Transform one raw output line into zero or one canonical events.
    ///
    /// Never fails - lines that do not decode degrade to a raw `Text`
    /// event carrying the input verbatim.
    pub fn parse_line(&self, line: &str) -> Option<AgentEvent> {
        match self {
            AgentParser::Claude(p) => p.parse_line(line),
            AgentParser::Codex(p) => p.parse_line(line),
            AgentParser::Gemini(p) => p.parse_line(line),
        }
    }

    /// Inspect a structurally error-shaped line for a structured error.
    ///
    /// Plain prose - even when it decodes as JSON - is never
    /// pattern-matched, so an agent talking about failures does not
    /// classify as failing.
    pub fn detect_error_from_line(&self, line: &str) -> Option<AgentError> {
        match self {
            AgentParser::Claude(p) => p.detect_error_from_line(line),
            AgentParser::Codex(p) => p.detect_error_from_line(line),
            AgentParser::Gemini(p) => p.detect_error_from_line(line),
        }
    }

    /// Classify a process exit. Exit failures are never reported as `None`.
    pub fn detect_error_from_exit(
        &self,
        exit_code: i32,
        stderr: &str,
        stdout: &str,
    ) -> Option<AgentError> {
        classify_exit(self.agent_id(), exit_code, stderr, stdout)
    }

    /// Session identifier carried by an already-produced event, if any.
    pub fn extract_session_id<'a>(&self, event: &'a AgentEvent) -> Option<&'a str> {
        event.session_id.as_deref()
    }

    /// Usage carried by an already-produced event, if the variant has one.
    pub fn extract_usage<'a>(&self, event: &'a AgentEvent) -> Option<&'a Usage> {
        event.usage()
    }

    /// Whether an already-produced event is a step's final answer.
    pub fn is_final_result(&self, event: &AgentEvent) -> bool {
        event.is_final_result()
    }
}

/// Build the spawn configuration for an agent family by registry key.
pub fn build_spawn_config(agent_id: &str, launch: LaunchSpec) -> Option<SpawnConfig> {
    match agent_id {
        claude::AGENT_ID => Some(
            claude::ClaudeConfig {
                binary_path: launch.binary_path,
                working_dir: launch.working_dir,
                prompt: launch.prompt,
                resume_session: launch.resume_session,
                model: launch.model,
                shell_prefix: launch.shell_prefix,
            }
            .build(),
        ),
        codex::AGENT_ID => Some(
            codex::CodexConfig {
                binary_path: launch.binary_path,
                working_dir: launch.working_dir,
                prompt: launch.prompt,
                resume_session: launch.resume_session,
                model: launch.model,
                shell_prefix: launch.shell_prefix,
            }
            .build(),
        ),
        gemini::AGENT_ID => Some(
            gemini::GeminiConfig {
                binary_path: launch.binary_path,
                working_dir: launch.working_dir,
                prompt: launch.prompt,
                resume_session: launch.resume_session,
                model: launch.model,
                shell_prefix: launch.shell_prefix,
            }
            .build(),
        ),
        _ => None,
    }
}

const STDERR_EXCERPT_LEN: usize = 300;

/// Shared exit-code classification.
///
/// The families differ only in which pattern table applies; the control
/// flow is identical, so it lives here instead of in each parser.
fn classify_exit(agent_id: &str, exit_code: i32, stderr: &str, stdout: &str) -> Option<AgentError> {
    let table = registry::error_table_for(agent_id);

    if exit_code == 0 {
        // One family is known to exit 0 on fatal misconfiguration, with
        // the complaint on stderr and nothing on stdout. Anything else
        // that exits 0 is a success.
        if stderr.trim().is_empty() || !stdout.trim().is_empty() {
            return None;
        }
        if let Some(m) = table.matches(stderr) {
            return Some(AgentError::from_match(agent_id, m, stderr));
        }
        let summary = first_meaningful_stderr_line(stderr)
            .unwrap_or("the agent exited with unexplained error output");
        return Some(AgentError::crashed(
            agent_id,
            format!("The agent failed to start: {summary}"),
            stderr,
        ));
    }

    if let Some(m) = table.matches(stderr).or_else(|| table.matches(stdout)) {
        return Some(AgentError::from_match(agent_id, m, stderr));
    }

    let mut message = format!("The agent process exited unexpectedly (code {exit_code})");
    let excerpt = excerpt(stderr);
    if !excerpt.is_empty() {
        message.push_str(": ");
        message.push_str(&excerpt);
    }
    Some(AgentError::crashed(agent_id, message, stderr))
}

static SOURCE_CONTEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+\s*[|:]").expect("valid regex"));
static ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][\w$.\[\]]*\s*=[^=]").expect("valid regex"));
static FAILURE_WORD: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"\b(error|failed|failure|cannot|unable|missing|not found|fatal|invalid|exception)\b")
        .case_insensitive(true)
        .build()
        .expect("valid regex")
});

/// Best-effort pick of the stderr line most worth showing a human.
///
/// Skips lines that read as source context rather than prose: empty
/// lines, pure punctuation (caret markers and the like), numbered
/// source-context lines, stack frames, and bare assignments. Among the
/// survivors, a line containing a failure-indicating word wins; otherwise
/// the first survivor does.
fn first_meaningful_stderr_line(stderr: &str) -> Option<&str> {
    let prose: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| looks_like_prose(l))
        .collect();
    prose
        .iter()
        .copied()
        .find(|l| FAILURE_WORD.is_match(l))
        .or_else(|| prose.first().copied())
}

fn looks_like_prose(line: &str) -> bool {
    if line.is_empty() || !line.chars().any(char::is_alphanumeric) {
        return false;
    }
    if SOURCE_CONTEXT.is_match(line) || ASSIGNMENT.is_match(line) {
        return false;
    }
    if line.starts_with("at ") || line.contains("node_modules/") {
        return false;
    }
    true
}

/// One-line stderr excerpt for crash messages, whitespace-collapsed and
/// truncated on a char boundary.
fn excerpt(stderr: &str) -> String {
    let flat = stderr.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= STDERR_EXCERPT_LEN {
        return flat;
    }
    let mut cut: String = flat.chars().take(STDERR_EXCERPT_LEN).collect();
    cut.push_str("...");
    cut
}
