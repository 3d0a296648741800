//! Per-session raw transcript logging.
//!
//! Every session can keep an append-only transcript of its raw I/O
//! (STDIN/STDOUT/STDERR), separate from the structured `log` facade the
//! rest of the crate uses. These files are what you read when a parser
//! disagrees with an agent about what was actually said.

use chrono::Utc;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex},
};

/// Thread-safe handle to an append-only transcript file.
///
/// `None` inside the handle means logging is disabled for the session;
/// writes become no-ops rather than errors.
pub type LogHandle = Arc<Mutex<Option<File>>>;

/// Write a timestamped, direction-tagged line to the transcript.
pub fn log_line(handle: &LogHandle, direction: &str, data: &str) {
    if let Ok(mut guard) = handle.lock() {
        if let Some(ref mut file) = *guard {
            let ts = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
            let _ = writeln!(file, "[{}] {}: {}", ts, direction, data);
            let _ = file.flush();
        }
    }
}

/// Open (or create) `{log_dir}/{log_id}.log` and return a shared handle.
///
/// Passing no directory yields a disabled handle.
pub fn open_log_file(log_dir: Option<&str>, log_id: &str) -> LogHandle {
    let file = log_dir.and_then(|dir| {
        let path = Path::new(dir).join(format!("{}.log", log_id));
        std::fs::create_dir_all(dir).ok()?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    Arc::new(Mutex::new(file))
}
