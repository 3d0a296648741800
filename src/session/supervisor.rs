//! The session process supervisor.
//!
//! Owns one spawned agent process per session. Every output line flows
//! supervisor → parser → (classifier, if error-shaped) → canonical
//! event or agent error, and out to subscribers over the event bus.
//! Lines are handled in arrival order on one thread per session - strict
//! FIFO within a session, full independence across sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::broadcast;

use super::state::{Session, SessionId, SessionState};
use crate::agents::{self, LaunchSpec};
use crate::event_bus::{topic, BroadcastEvent, EventBus};
use crate::logging::{log_line, open_log_file, LogHandle};
use crate::registry;
use crate::spawn::{AgentExit, AgentProcess, ProcessEvent};
use crate::usage::Usage;

/// Configuration for starting one session.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Registry key of the agent family to run.
    pub agent_id: String,
    pub binary_path: String,
    pub working_dir: String,
    pub prompt: String,
    pub model: Option<String>,
    /// Agent-side session id to resume, if any.
    pub resume_session: Option<String>,
    pub shell_prefix: Option<String>,
    /// Directory for raw transcript logs; `None` disables them.
    pub log_dir: Option<String>,
}

/// The only operations that fail loudly: spawn, kill, and stdin writes.
/// Parsing and classification degrade instead of erroring.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Failed to spawn agent: {0}")]
    SpawnFailed(String),

    #[error("Failed to write to agent stdin: {0}")]
    StdinFailed(String),
}

struct SessionEntry {
    session: Arc<Mutex<Session>>,
    process: Arc<Mutex<Option<AgentProcess>>>,
    log_file: LogHandle,
}

/// Manages all active sessions and their event pipelines.
pub struct Supervisor {
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
    bus: Arc<EventBus>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::with_bus(Arc::new(EventBus::new()))
    }

    /// Share an externally owned bus, e.g. one the embedding application
    /// already fans out to its interfaces.
    pub fn with_bus(bus: Arc<EventBus>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            bus,
        }
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    /// Subscribe to every session's events, errors, stderr, and close
    /// notifications. Filter by topic.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.bus.subscribe()
    }

    /// Start a session: look up the family's parser, spawn its process,
    /// and begin forwarding normalized events to subscribers.
    pub fn start(&self, config: SessionConfig) -> Result<SessionId, SupervisorError> {
        let parser = registry::parser_for(&config.agent_id)
            .ok_or_else(|| SupervisorError::UnknownAgent(config.agent_id.clone()))?;

        let spawn_config = agents::build_spawn_config(
            &config.agent_id,
            LaunchSpec {
                binary_path: config.binary_path.clone(),
                working_dir: config.working_dir.clone(),
                prompt: config.prompt.clone(),
                model: config.model.clone(),
                resume_session: config.resume_session.clone(),
                shell_prefix: config.shell_prefix.clone(),
            },
        )
        .ok_or_else(|| SupervisorError::UnknownAgent(config.agent_id.clone()))?;

        let session_id = SessionId::new();
        let log_file = open_log_file(config.log_dir.as_deref(), &session_id.0);
        if let Some(ref initial) = spawn_config.initial_stdin {
            log_line(&log_file, "STDIN", initial);
        }

        let mut process =
            AgentProcess::spawn(spawn_config).map_err(SupervisorError::SpawnFailed)?;

        // Take the receiver out so the forwarding thread can block on it
        // without holding any lock on the process.
        let receiver = process.take_receiver().ok_or_else(|| {
            SupervisorError::SpawnFailed("Failed to take event receiver".to_string())
        })?;

        let mut session = Session::new(
            session_id.clone(),
            config.agent_id.clone(),
            config.working_dir.clone(),
        );
        session.agent_session_id = config.resume_session.clone();
        let session_arc = Arc::new(Mutex::new(session));

        let entry = SessionEntry {
            session: Arc::clone(&session_arc),
            process: Arc::new(Mutex::new(Some(process))),
            log_file: Arc::clone(&log_file),
        };
        let process_arc = Arc::clone(&entry.process);
        self.sessions
            .lock()
            .unwrap()
            .insert(session_id.clone(), entry);

        log::info!("started {} session {}", config.agent_id, session_id);

        let bus = Arc::clone(&self.bus);
        let sid = session_id.clone();
        std::thread::spawn(move || {
            // Accumulated streams for exit-code inspection.
            let mut stdout_acc = String::new();
            let mut stderr_acc = String::new();
            let mut exit_info: Option<AgentExit> = None;

            // Drain until the channel closes, even past the exit
            // notification - the reader threads may still be delivering
            // the final lines when the exit watcher reports.
            while let Ok(event) = receiver.recv() {
                match event {
                    ProcessEvent::Stdout(line) => {
                        log::debug!("agent stdout [{}]: {}", sid, line);
                        log_line(&log_file, "STDOUT", &line);
                        stdout_acc.push_str(&line);
                        stdout_acc.push('\n');

                        // Errors travel on their own channel, never as text.
                        if let Some(err) = parser.detect_error_from_line(&line) {
                            bus.emit(&topic::error(&sid), &err);
                            continue;
                        }

                        if let Some(event) = parser.parse_line(&line) {
                            {
                                let mut session = session_arc.lock().unwrap();
                                if let Some(aid) = parser.extract_session_id(&event) {
                                    session.agent_session_id = Some(aid.to_string());
                                }
                                if let Some(usage) = parser.extract_usage(&event) {
                                    session.usage.fold(usage);
                                }
                            }
                            bus.emit(&topic::event(&sid), &event);
                        }
                    }

                    ProcessEvent::Stderr(line) => {
                        log::warn!("agent stderr [{}]: {}", sid, line);
                        log_line(&log_file, "STDERR", &line);
                        stderr_acc.push_str(&line);
                        stderr_acc.push('\n');
                        bus.emit(&topic::stderr(&sid), &line);
                    }

                    ProcessEvent::Exit(exit) => {
                        exit_info = Some(exit);
                    }
                }
            }

            match exit_info {
                Some(exit) => {
                    if let Some(err) =
                        parser.detect_error_from_exit(exit.code, &stderr_acc, &stdout_acc)
                    {
                        bus.emit(&topic::error(&sid), &err);
                    }
                    {
                        let mut session = session_arc.lock().unwrap();
                        // A killed session stays Killed.
                        if session.state == SessionState::Running {
                            session.state = SessionState::Exited(exit.code);
                        }
                    }
                    process_arc.lock().unwrap().take();
                    log::info!("session {} exited with code {}", sid, exit.code);
                    bus.emit(&topic::close(&sid), &exit);
                }
                // The channel closed without an exit notification: the
                // process was killed out from under its readers. Close the
                // session; in-flight partial text is dropped, not drained.
                None => {
                    {
                        let mut session = session_arc.lock().unwrap();
                        if session.state == SessionState::Running {
                            session.state = SessionState::Killed;
                        }
                    }
                    process_arc.lock().unwrap().take();
                    log::info!("session {} closed after kill", sid);
                    bus.emit(
                        &topic::close(&sid),
                        &AgentExit {
                            code: 0,
                            signal: None,
                        },
                    );
                }
            }
        });

        Ok(session_id)
    }

    /// Write a line to a session's stdin.
    pub fn write_stdin(&self, session_id: &SessionId, data: &str) -> Result<(), SupervisorError> {
        let map = self.sessions.lock().unwrap();
        let entry = map
            .get(session_id)
            .ok_or_else(|| SupervisorError::NotFound(session_id.clone()))?;
        log_line(&entry.log_file, "STDIN", data);

        let guard = entry.process.lock().unwrap();
        match guard.as_ref() {
            Some(process) => process
                .write_stdin(data)
                .map_err(SupervisorError::StdinFailed),
            None => Err(SupervisorError::StdinFailed(format!(
                "no active process for session {}",
                session_id
            ))),
        }
    }

    /// Kill a session's process and move its record to terminal state.
    ///
    /// Partial text still in flight is not delivered afterwards.
    pub fn kill(&self, session_id: &SessionId) -> Result<(), SupervisorError> {
        let map = self.sessions.lock().unwrap();
        let entry = map
            .get(session_id)
            .ok_or_else(|| SupervisorError::NotFound(session_id.clone()))?;

        // Mark first so the forwarding thread never reports Exited for a
        // session the caller cancelled.
        entry.session.lock().unwrap().state = SessionState::Killed;
        if let Some(process) = entry.process.lock().unwrap().take() {
            process.kill();
        }
        log::info!("killed session {}", session_id);
        Ok(())
    }

    pub fn is_running(&self, session_id: &SessionId) -> bool {
        let map = self.sessions.lock().unwrap();
        map.get(session_id)
            .map(|e| e.process.lock().unwrap().is_some())
            .unwrap_or(false)
    }

    pub fn list_sessions(&self) -> Vec<SessionId> {
        self.sessions.lock().unwrap().keys().cloned().collect()
    }

    pub fn session_state(&self, session_id: &SessionId) -> Option<SessionState> {
        let map = self.sessions.lock().unwrap();
        map.get(session_id).map(|e| e.session.lock().unwrap().state)
    }

    /// Cumulative usage for a session so far.
    pub fn session_usage(&self, session_id: &SessionId) -> Option<Usage> {
        let map = self.sessions.lock().unwrap();
        map.get(session_id)
            .map(|e| e.session.lock().unwrap().usage.clone())
    }

    /// The session id the agent itself reported, for resuming later.
    pub fn agent_session_id(&self, session_id: &SessionId) -> Option<String> {
        let map = self.sessions.lock().unwrap();
        map.get(session_id)
            .and_then(|e| e.session.lock().unwrap().agent_session_id.clone())
    }

    /// Drop a terminal session's record. Refuses to drop a live one.
    pub fn remove_session(&self, session_id: &SessionId) -> bool {
        let mut map = self.sessions.lock().unwrap();
        let terminal = map
            .get(session_id)
            .map(|e| e.session.lock().unwrap().state.is_terminal())
            .unwrap_or(false);
        if terminal {
            map.remove(session_id);
        }
        terminal
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::parallel;

    fn config(agent_id: &str, binary: &str) -> SessionConfig {
        SessionConfig {
            agent_id: agent_id.to_string(),
            binary_path: binary.to_string(),
            working_dir: "/tmp".to_string(),
            prompt: "hello".to_string(),
            ..SessionConfig::default()
        }
    }

    /// Drain the bus until a close event for `sid` arrives, collecting
    /// everything seen on the way.
    async fn drain_until_close(
        rx: &mut broadcast::Receiver<BroadcastEvent>,
        sid: &SessionId,
    ) -> Vec<BroadcastEvent> {
        let mut seen = Vec::new();
        let close = topic::close(sid);
        loop {
            let event = tokio::time::timeout(std::time::Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for close")
                .expect("bus closed");
            let done = event.topic == close;
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    #[test]
    #[parallel]
    fn unknown_agent_fails_loudly() {
        let supervisor = Supervisor::new();
        let result = supervisor.start(config("not-a-real-agent", "echo"));
        assert!(
            matches!(result, Err(SupervisorError::UnknownAgent(id)) if id == "not-a-real-agent")
        );
    }

    #[test]
    #[parallel]
    fn spawn_failure_is_reported() {
        let supervisor = Supervisor::new();
        let mut cfg = config("gemini", "echo");
        cfg.shell_prefix = Some("/definitely/not/a/shell -c".to_string());
        let result = supervisor.start(cfg);
        assert!(matches!(result, Err(SupervisorError::SpawnFailed(_))));
    }

    #[test]
    fn write_stdin_to_unknown_session_is_not_found() {
        let supervisor = Supervisor::new();
        let result = supervisor.write_stdin(&SessionId::new(), "ping");
        assert!(matches!(result, Err(SupervisorError::NotFound(_))));
    }

    #[test]
    fn kill_unknown_session_is_not_found() {
        let supervisor = Supervisor::new();
        assert!(matches!(
            supervisor.kill(&SessionId::new()),
            Err(SupervisorError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    mod with_real_processes {
        use super::*;
        use crate::errors::ErrorCategory;
        use std::os::unix::fs::PermissionsExt;

        /// A fake agent binary: ignores its arguments and runs the script
        /// body, so the supervisor pipeline can be driven end to end.
        fn fake_agent(dir: &tempfile::TempDir, body: &str) -> String {
            let path = dir.path().join("fake-agent");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_str().unwrap().to_string()
        }

        #[tokio::test(flavor = "multi_thread")]
        #[parallel]
        async fn session_emits_events_and_close_in_order() {
            let dir = tempfile::tempdir().unwrap();
            let binary = fake_agent(
                &dir,
                r#"echo '{"type":"system","subtype":"init","session_id":"sess-up"}'
echo '{"type":"result","subtype":"success","result":"done","usage":{"input_tokens":40,"output_tokens":8}}'"#,
            );

            let supervisor = Supervisor::new();
            let mut rx = supervisor.subscribe();
            let sid = supervisor.start(config("claude", &binary)).unwrap();

            let seen = drain_until_close(&mut rx, &sid).await;

            let event_topic = topic::event(&sid);
            let kinds: Vec<String> = seen
                .iter()
                .filter(|e| e.topic == event_topic)
                .map(|e| e.payload["kind"].as_str().unwrap_or("").to_string())
                .collect();
            assert_eq!(kinds, vec!["init", "result"]);

            // No error was emitted for a clean run.
            let error_topic = topic::error(&sid);
            assert!(seen.iter().all(|e| e.topic != error_topic));

            // Usage from the result event was folded into the session.
            let usage = supervisor.session_usage(&sid).unwrap();
            assert_eq!(usage.input_tokens, 40);
            assert_eq!(usage.output_tokens, 8);

            // The agent-side session id was captured for resuming.
            assert_eq!(
                supervisor.agent_session_id(&sid).as_deref(),
                Some("sess-up")
            );

            assert_eq!(
                supervisor.session_state(&sid),
                Some(SessionState::Exited(0))
            );
            assert!(!supervisor.is_running(&sid));
        }

        #[tokio::test(flavor = "multi_thread")]
        #[parallel]
        async fn structured_error_goes_to_the_error_channel() {
            let dir = tempfile::tempdir().unwrap();
            let binary = fake_agent(
                &dir,
                r#"echo '{"type":"error","error":{"message":"Claude usage limit reached"}}'"#,
            );

            let supervisor = Supervisor::new();
            let mut rx = supervisor.subscribe();
            let sid = supervisor.start(config("claude", &binary)).unwrap();

            let seen = drain_until_close(&mut rx, &sid).await;

            let error_topic = topic::error(&sid);
            let errors: Vec<&BroadcastEvent> =
                seen.iter().filter(|e| e.topic == error_topic).collect();
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].payload["category"], "token_exhaustion");

            // The error line did not leak into the event stream as text.
            let event_topic = topic::event(&sid);
            assert!(seen.iter().all(|e| e.topic != event_topic));
        }

        #[tokio::test(flavor = "multi_thread")]
        #[parallel]
        async fn nonzero_exit_synthesizes_a_crash_error() {
            let dir = tempfile::tempdir().unwrap();
            let binary = fake_agent(&dir, "exit 7");

            let supervisor = Supervisor::new();
            let mut rx = supervisor.subscribe();
            let sid = supervisor.start(config("claude", &binary)).unwrap();

            let seen = drain_until_close(&mut rx, &sid).await;

            let error_topic = topic::error(&sid);
            let err = seen
                .iter()
                .find(|e| e.topic == error_topic)
                .expect("expected an exit error");
            assert_eq!(
                err.payload["category"],
                ErrorCategory::AgentCrashed.as_str()
            );
            assert!(err.payload["message"].as_str().unwrap().contains('7'));

            assert_eq!(
                supervisor.session_state(&sid),
                Some(SessionState::Exited(7))
            );
        }

        #[tokio::test(flavor = "multi_thread")]
        #[parallel]
        async fn stderr_lines_are_forwarded_and_accumulated() {
            let dir = tempfile::tempdir().unwrap();
            let binary = fake_agent(
                &dir,
                r#"echo 'Error: connection refused by upstream' >&2
exit 1"#,
            );

            let supervisor = Supervisor::new();
            let mut rx = supervisor.subscribe();
            let sid = supervisor.start(config("claude", &binary)).unwrap();

            let seen = drain_until_close(&mut rx, &sid).await;

            let stderr_topic = topic::stderr(&sid);
            assert!(seen.iter().any(|e| e.topic == stderr_topic));

            // The accumulated stderr matched a network pattern rather
            // than falling back to a generic crash.
            let error_topic = topic::error(&sid);
            let err = seen.iter().find(|e| e.topic == error_topic).unwrap();
            assert_eq!(err.payload["category"], "network_error");
        }

        #[tokio::test(flavor = "multi_thread")]
        #[parallel]
        async fn kill_moves_session_to_killed_and_closes() {
            let dir = tempfile::tempdir().unwrap();
            let binary = fake_agent(&dir, "sleep 30");

            let supervisor = Supervisor::new();
            let mut rx = supervisor.subscribe();
            let sid = supervisor.start(config("claude", &binary)).unwrap();
            assert!(supervisor.is_running(&sid));
            supervisor.write_stdin(&sid, "ping").unwrap();

            supervisor.kill(&sid).unwrap();
            drain_until_close(&mut rx, &sid).await;

            assert_eq!(supervisor.session_state(&sid), Some(SessionState::Killed));
            assert!(!supervisor.is_running(&sid));
        }

        #[tokio::test(flavor = "multi_thread")]
        #[parallel]
        async fn remove_session_only_drops_terminal_records() {
            let dir = tempfile::tempdir().unwrap();
            let binary = fake_agent(&dir, "sleep 30");

            let supervisor = Supervisor::new();
            let mut rx = supervisor.subscribe();
            let sid = supervisor.start(config("claude", &binary)).unwrap();

            assert!(!supervisor.remove_session(&sid));
            assert!(supervisor.list_sessions().contains(&sid));

            supervisor.kill(&sid).unwrap();
            drain_until_close(&mut rx, &sid).await;

            assert!(supervisor.remove_session(&sid));
            assert!(supervisor.list_sessions().is_empty());
        }

        #[tokio::test(flavor = "multi_thread")]
        #[parallel]
        async fn sessions_are_independent() {
            let dir = tempfile::tempdir().unwrap();
            let ok = fake_agent(&dir, r#"echo '{"event":"init","data":{"session":"g-1"}}'"#);

            let supervisor = Supervisor::new();
            let mut rx = supervisor.subscribe();
            let sid_a = supervisor.start(config("gemini", &ok)).unwrap();
            let sid_b = supervisor.start(config("gemini", &ok)).unwrap();
            assert_ne!(sid_a, sid_b);

            // Both close independently; order between sessions is not
            // guaranteed, so wait for each.
            let mut open: std::collections::HashSet<String> =
                [topic::close(&sid_a), topic::close(&sid_b)].into();
            while !open.is_empty() {
                let event =
                    tokio::time::timeout(std::time::Duration::from_secs(10), rx.recv())
                        .await
                        .expect("timed out")
                        .expect("bus closed");
                open.remove(&event.topic);
            }
        }

        #[tokio::test(flavor = "multi_thread")]
        #[parallel]
        async fn transcript_log_records_raw_io() {
            let log_dir = tempfile::tempdir().unwrap();
            let agent_dir = tempfile::tempdir().unwrap();
            let binary = fake_agent(&agent_dir, r#"echo '{"type":"result","result":"ok"}'"#);

            let supervisor = Supervisor::new();
            let mut rx = supervisor.subscribe();
            let mut cfg = config("claude", &binary);
            cfg.log_dir = Some(log_dir.path().to_str().unwrap().to_string());
            let sid = supervisor.start(cfg).unwrap();

            drain_until_close(&mut rx, &sid).await;

            let contents =
                std::fs::read_to_string(log_dir.path().join(format!("{}.log", sid))).unwrap();
            assert!(contents.contains("STDIN"));
            assert!(contents.contains("STDOUT: {\"type\":\"result\",\"result\":\"ok\"}"));
        }
    }
}
