//! Per-session state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::usage::Usage;

/// Unique identifier for a session, minted by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Liveness of the underlying agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Process is alive and its output is being consumed.
    Running,
    /// Process exited on its own with this code.
    Exited(i32),
    /// Process was killed through the supervisor.
    Killed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Running)
    }
}

/// One agent session: exactly one record per active process.
///
/// The supervisor is the sole owner and the only component that mutates
/// these fields.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,

    /// Which agent family runs this session.
    pub agent_id: String,

    pub working_dir: String,

    pub state: SessionState,

    /// Session identifier the agent itself reported in-stream, used for
    /// resuming. Distinct from [`Session::id`], which is ours.
    pub agent_session_id: Option<String>,

    /// Cumulative usage folded from this session's result events.
    pub usage: Usage,
}

impl Session {
    pub fn new(id: SessionId, agent_id: String, working_dir: String) -> Self {
        Self {
            id,
            agent_id,
            working_dir,
            state: SessionState::Running,
            agent_session_id: None,
            usage: Usage::default(),
        }
    }
}
