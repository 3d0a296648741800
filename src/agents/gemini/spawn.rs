//! Gemini-family spawn configuration.

use crate::spawn::SpawnConfig;

/// Configuration options for launching a gemini-family agent.
#[derive(Debug, Clone, Default)]
pub struct GeminiConfig {
    pub binary_path: String,
    pub working_dir: String,
    pub prompt: String,
    pub resume_session: Option<String>,
    pub model: Option<String>,
    pub shell_prefix: Option<String>,
}

impl GeminiConfig {
    /// Build a [`SpawnConfig`] for the gemini CLI.
    ///
    /// One-shot model: the prompt goes on the command line, the process
    /// runs unattended (`--approval-mode auto`), and stdin is unused.
    pub fn build(self) -> SpawnConfig {
        let mut args = vec![
            "--output-format".to_string(),
            "ndjson".to_string(),
            "--approval-mode".to_string(),
            "auto".to_string(),
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

        args.push("--prompt".to_string());
        args.push(self.prompt);

        let mut config = SpawnConfig::new(&self.binary_path, args)
            .working_dir(&self.working_dir)
            .no_stdin();

        if let Some(ref shell) = self.shell_prefix {
            config = config.shell_prefix(shell);
        }

        config
    }
}
