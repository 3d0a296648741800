//! Session lifecycle: records, liveness state, and the process supervisor.

mod state;
mod supervisor;

pub use state::{Session, SessionId, SessionState};
pub use supervisor::{SessionConfig, Supervisor, SupervisorError};
