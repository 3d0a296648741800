//! Codex-family spawn configuration.

use crate::spawn::SpawnConfig;

/// Configuration options for launching a codex-family agent.
#[derive(Debug, Clone, Default)]
pub struct CodexConfig {
    pub binary_path: String,
    pub working_dir: String,
    pub prompt: String,
    pub resume_session: Option<String>,
    pub model: Option<String>,
    pub shell_prefix: Option<String>,
}

impl CodexConfig {
    /// Build a [`SpawnConfig`] for the codex app-server.
    ///
    /// The server speaks JSON-RPC over stdio; the first turn is kicked off
    /// by writing a `turn/start` request to stdin after spawn.
    pub fn build(self) -> SpawnConfig {
        let mut args: Vec<String> = vec!["app-server".to_string()];

        if let Some(ref model) = self.model {
            if !model.is_empty() {
                args.push("-c".to_string());
                args.push(format!("model=\"{}\"", model));
            }
        }

        let mut params = serde_json::json!({
            "prompt": self.prompt,
            "cwd": self.working_dir,
        });
        if let Some(ref id) = self.resume_session {
            params["thread_id"] = serde_json::Value::String(id.clone());
        }
        let initial = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "turn/start",
            "params": params,
        });

        let mut config = SpawnConfig::new(&self.binary_path, args)
            .working_dir(&self.working_dir)
            .initial_stdin(initial.to_string());

        if let Some(ref shell) = self.shell_prefix {
            config = config.shell_prefix(shell);
        }

        config
    }
}
