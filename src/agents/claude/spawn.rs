//! Claude-family spawn configuration.

use crate::spawn::SpawnConfig;

/// Configuration options for launching a claude-family agent.
#[derive(Debug, Clone, Default)]
pub struct ClaudeConfig {
    pub binary_path: String,
    pub working_dir: String,
    pub prompt: String,
    pub resume_session: Option<String>,
    pub model: Option<String>,
    pub shell_prefix: Option<String>,
}

impl ClaudeConfig {
    /// Build a [`SpawnConfig`] for the claude CLI.
    ///
    /// The CLI speaks stream-json on both stdin and stdout; the initial
    /// prompt is delivered as a user message over stdin after spawn.
    pub fn build(self) -> SpawnConfig {
        let mut args = vec![
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--input-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ];

        if let Some(ref model) = self.model {
            if !model.is_empty() {
                args.push("--model".to_string());
                args.push(model.clone());
            }
        }

        if let Some(ref id) = self.resume_session {
            args.push("--resume".to_string());
            args.push(id.clone());
        }

        let prompt_json = serde_json::json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": self.prompt
            }
        });

        let mut config = SpawnConfig::new(&self.binary_path, args)
            .working_dir(&self.working_dir)
            .initial_stdin(prompt_json.to_string());

        if let Some(ref shell) = self.shell_prefix {
            config = config.shell_prefix(shell);
        }

        config
    }
}
