//! Process-wide registries for per-agent pattern tables and parsers.
//!
//! Both registries are read-heavy: lookups happen on every classified
//! line, while writes happen at startup wiring or test setup. They are
//! guarded by `RwLock` accordingly. Writing while sessions are actively
//! parsing is unsupported - callers own that discipline.
//!
//! The explicit `set`/`clear`/`install_defaults` lifecycle exists so that
//! tests and hot-reload can reset state deliberately instead of relying
//! on ambient singletons with no reset path.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::agents::{claude, codex, gemini, AgentParser};
use crate::errors::PatternTable;

static ERROR_TABLES: Lazy<RwLock<HashMap<String, PatternTable>>> =
    Lazy::new(|| RwLock::new(default_error_tables()));

static PARSERS: Lazy<RwLock<HashMap<String, AgentParser>>> =
    Lazy::new(|| RwLock::new(default_parsers()));

fn default_error_tables() -> HashMap<String, PatternTable> {
    HashMap::from([
        (claude::AGENT_ID.to_string(), claude::error_patterns()),
        (codex::AGENT_ID.to_string(), codex::error_patterns()),
        (gemini::AGENT_ID.to_string(), gemini::error_patterns()),
    ])
}

fn default_parsers() -> HashMap<String, AgentParser> {
    HashMap::from([
        (
            claude::AGENT_ID.to_string(),
            AgentParser::Claude(claude::ClaudeParser::new()),
        ),
        (
            codex::AGENT_ID.to_string(),
            AgentParser::Codex(codex::CodexParser::new()),
        ),
        (
            gemini::AGENT_ID.to_string(),
            AgentParser::Gemini(gemini::GeminiParser::new()),
        ),
    ])
}

/// Pattern table for an agent id. Unknown ids get an empty table - this
/// never fails.
pub fn error_table_for(agent_id: &str) -> PatternTable {
    ERROR_TABLES
        .read()
        .unwrap()
        .get(agent_id)
        .cloned()
        .unwrap_or_default()
}

/// Install or replace the pattern table for an agent id. Last write wins.
pub fn set_error_table(agent_id: impl Into<String>, table: PatternTable) {
    ERROR_TABLES.write().unwrap().insert(agent_id.into(), table);
}

/// Remove every registered pattern table.
pub fn clear_error_tables() {
    ERROR_TABLES.write().unwrap().clear();
}

/// Re-register the built-in tables for the three supported families,
/// replacing any overrides.
pub fn install_default_error_tables() {
    *ERROR_TABLES.write().unwrap() = default_error_tables();
}

/// Parser for an agent id, if one is registered.
pub fn parser_for(agent_id: &str) -> Option<AgentParser> {
    PARSERS.read().unwrap().get(agent_id).copied()
}

/// Install or replace the parser for an agent id. Last write wins.
pub fn set_parser(agent_id: impl Into<String>, parser: AgentParser) {
    PARSERS.write().unwrap().insert(agent_id.into(), parser);
}

/// Remove every registered parser.
pub fn clear_parsers() {
    PARSERS.write().unwrap().clear();
}

/// Re-register the built-in parsers for the three supported families,
/// replacing any overrides.
pub fn install_default_parsers() {
    *PARSERS.write().unwrap() = default_parsers();
}
