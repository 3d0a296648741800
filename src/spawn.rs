//! Agent process spawning and I/O plumbing.
//!
//! Spawns agent binaries in the user's login shell (so PATH and
//! environment are what the user expects), captures stdout/stderr as line
//! streams, and reports exit through the same channel. The transport
//! contract upstream of the parsers is exactly this: lines in, one exit
//! event out.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Exit status delivered when an agent process terminates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentExit {
    pub code: i32,
    pub signal: Option<i32>,
}

/// Events emitted by a running agent process.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// A line was read from stdout.
    Stdout(String),
    /// A line was read from stderr.
    Stderr(String),
    /// The process exited.
    Exit(AgentExit),
}

/// Configuration for spawning one agent process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    pub binary_path: String,
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    /// Custom shell invocation, e.g. "/bin/zsh -l -c".
    pub shell_prefix: Option<String>,
    /// Written to stdin immediately after spawn.
    pub initial_stdin: Option<String>,
    pub uses_stdin: bool,
}

impl SpawnConfig {
    pub fn new(binary_path: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            args,
            working_dir: None,
            shell_prefix: None,
            initial_stdin: None,
            uses_stdin: true,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn shell_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.shell_prefix = Some(prefix.into());
        self
    }

    pub fn initial_stdin(mut self, message: impl Into<String>) -> Self {
        self.initial_stdin = Some(message.into());
        self
    }

    /// For one-shot agents that take everything on the command line.
    pub fn no_stdin(mut self) -> Self {
        self.uses_stdin = false;
        self
    }
}

/// Prepend the binary's parent directory to PATH so sibling tools resolve.
fn prepare_path_env(cmd: &mut Command, binary_path: &str) {
    if binary_path.contains('/') {
        if let Some(dir) = std::path::Path::new(binary_path).parent() {
            if let Some(dir_str) = dir.to_str() {
                let existing = std::env::var("PATH").unwrap_or_default();
                let combined = if existing.is_empty() {
                    dir_str.to_string()
                } else {
                    format!("{}:{}", dir_str, existing)
                };
                cmd.env("PATH", combined);
            }
        }
    }
}

/// Build a command that runs the binary with args in a login shell.
///
/// The command is shell-quoted and handed to `<prefix> '<command>'`,
/// where the default prefix is `$SHELL -l -c` with a bash/sh fallback for
/// non-POSIX shells. On Windows the binary runs directly.
#[cfg(unix)]
fn build_login_shell_command(
    binary_path: &str,
    args: &[String],
    working_dir: Option<&str>,
    shell_prefix: Option<&str>,
) -> Result<Command, String> {
    let prefix = login_shell_prefix(shell_prefix);
    let prefix_parts: Vec<&str> = prefix.split_whitespace().collect();
    if prefix_parts.is_empty() {
        return Err("Empty shell prefix".to_string());
    }

    let mut command_parts = Vec::with_capacity(args.len() + 1);
    command_parts.push(
        shlex::try_quote(binary_path)
            .map_err(|_| format!("Invalid path: {}", binary_path))?
            .into_owned(),
    );
    for arg in args {
        command_parts.push(
            shlex::try_quote(arg)
                .map_err(|_| format!("Invalid argument: {}", arg))?
                .into_owned(),
        );
    }

    let mut cmd = Command::new(prefix_parts[0]);
    cmd.args(&prefix_parts[1..]).arg(command_parts.join(" "));

    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }
    prepare_path_env(&mut cmd, binary_path);

    Ok(cmd)
}

/// The shell invocation used to wrap agent commands.
///
/// A custom prefix is used verbatim. Otherwise `$SHELL -l -c`, falling
/// back to bash/sh for shells that do not support those flags.
#[cfg(unix)]
fn login_shell_prefix(custom: Option<&str>) -> String {
    if let Some(prefix) = custom {
        if !prefix.is_empty() {
            return prefix.to_string();
        }
    }

    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let shell_name = std::path::Path::new(&shell)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let non_posix = ["fish", "nu", "nushell", "elvish", "xonsh", "ion"];
    let effective = if non_posix.contains(&shell_name) {
        if std::path::Path::new("/bin/bash").exists() {
            "/bin/bash"
        } else {
            "/bin/sh"
        }
    } else {
        &shell
    };

    format!("{} -l -c", effective)
}

#[cfg(windows)]
fn build_login_shell_command(
    binary_path: &str,
    args: &[String],
    working_dir: Option<&str>,
    _shell_prefix: Option<&str>,
) -> Result<Command, String> {
    let mut cmd = Command::new(binary_path);
    cmd.args(args);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }
    prepare_path_env(&mut cmd, binary_path);
    Ok(cmd)
}

/// A running agent process.
///
/// Reader threads forward stdout/stderr lines and the final exit status
/// to a channel; the supervisor drains it in order on its own thread.
pub struct AgentProcess {
    child: Arc<Mutex<Option<Child>>>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    event_receiver: Receiver<ProcessEvent>,
}

impl AgentProcess {
    /// Spawn a new agent process and start its I/O threads.
    pub fn spawn(config: SpawnConfig) -> Result<Self, String> {
        let mut cmd = build_login_shell_command(
            &config.binary_path,
            &config.args,
            config.working_dir.as_deref(),
            config.shell_prefix.as_deref(),
        )?;

        if config.uses_stdin {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| format!("Failed to spawn: {}", e))?;

        let child_stdin = if config.uses_stdin {
            child.stdin.take()
        } else {
            None
        };
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "Failed to capture stdout".to_string())?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| "Failed to capture stderr".to_string())?;

        let (tx, rx) = mpsc::channel();
        let child_arc = Arc::new(Mutex::new(Some(child)));
        let stdin_arc = Arc::new(Mutex::new(child_stdin));

        if let Some(initial) = config.initial_stdin {
            let mut guard = stdin_arc.lock().unwrap();
            if let Some(ref mut stdin) = *guard {
                writeln!(stdin, "{}", initial)
                    .map_err(|e| format!("Failed to write initial stdin: {e}"))?;
            }
        }

        let tx_stdout = tx.clone();
        thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines().map_while(Result::ok) {
                if tx_stdout.send(ProcessEvent::Stdout(line)).is_err() {
                    break;
                }
            }
        });

        let tx_stderr = tx.clone();
        thread::spawn(move || {
            let reader = BufReader::new(stderr);
            for line in reader.lines().map_while(Result::ok) {
                if tx_stderr.send(ProcessEvent::Stderr(line)).is_err() {
                    break;
                }
            }
        });

        let child_arc_exit = Arc::clone(&child_arc);
        let stdin_arc_exit = Arc::clone(&stdin_arc);
        let tx_exit = tx;
        thread::spawn(move || loop {
            let mut guard = child_arc_exit.lock().unwrap();
            if let Some(child) = guard.as_mut() {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        let _ = tx_exit.send(ProcessEvent::Exit(AgentExit {
                            code: status.code().unwrap_or_default(),
                            signal: None,
                        }));
                        guard.take();
                        stdin_arc_exit.lock().unwrap().take();
                        break;
                    }
                    Ok(None) => {}
                    Err(_) => {
                        guard.take();
                        stdin_arc_exit.lock().unwrap().take();
                        break;
                    }
                }
            } else {
                break;
            }
            drop(guard);
            thread::sleep(Duration::from_millis(100));
        });

        Ok(Self {
            child: child_arc,
            stdin: stdin_arc,
            event_receiver: rx,
        })
    }

    /// Write a line to stdin. Fails loudly if stdin is gone.
    pub fn write_stdin(&self, data: &str) -> Result<(), String> {
        let mut guard = self.stdin.lock().unwrap();
        if let Some(ref mut stdin) = *guard {
            writeln!(stdin, "{}", data).map_err(|e| format!("Failed to write to stdin: {}", e))?;
            stdin
                .flush()
                .map_err(|e| format!("Failed to flush stdin: {}", e))?;
            Ok(())
        } else {
            Err("No active stdin".to_string())
        }
    }

    /// Receive the next event, blocking until one is available.
    pub fn recv(&self) -> Option<ProcessEvent> {
        self.event_receiver.recv().ok()
    }

    /// Take ownership of the event receiver, so the caller can block on it
    /// without holding any lock on the process.
    pub fn take_receiver(&mut self) -> Option<Receiver<ProcessEvent>> {
        let (_, dummy_rx) = mpsc::channel();
        Some(std::mem::replace(&mut self.event_receiver, dummy_rx))
    }

    pub fn is_running(&self) -> bool {
        self.child.lock().unwrap().is_some()
    }

    /// Stop gracefully: SIGINT on Unix with a grace window, then kill.
    pub fn stop(&self) {
        self.stdin.lock().unwrap().take();

        let mut guard = self.child.lock().unwrap();
        if let Some(ref mut child) = *guard {
            #[cfg(unix)]
            {
                let pid = child.id();
                unsafe {
                    libc::kill(pid as i32, libc::SIGINT);
                }
                for _ in 0..30 {
                    thread::sleep(Duration::from_millis(100));
                    match child.try_wait() {
                        Ok(Some(_)) => {
                            guard.take();
                            return;
                        }
                        Ok(None) => continue,
                        Err(_) => break,
                    }
                }
            }

            if let Some(mut child) = guard.take() {
                let _ = child.kill();
            }
        }
    }

    /// Kill immediately, no grace window.
    pub fn kill(&self) {
        self.stdin.lock().unwrap().take();
        if let Some(mut child) = self.child.lock().unwrap().take() {
            let _ = child.kill();
        }
    }
}
