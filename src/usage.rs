//! Token and cost accounting across agent backends.
//!
//! Agents disagree on how they report usage: the claude family emits a
//! per-model breakdown (a cheap routing model plus the main model) next to
//! a flat legacy total, the codex family reports a single flat object, and
//! the gemini family buries counts in its finish stats. Everything is
//! normalized into one [`Usage`] record here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Context window assumed when no model reports one.
pub const DEFAULT_CONTEXT_WINDOW: u64 = 200_000;

fn default_context_window() -> u64 {
    DEFAULT_CONTEXT_WINDOW
}

/// Normalized token/cost accounting for one result or one whole session.
///
/// Constructed per result event and never mutated afterwards; the
/// supervisor folds per-result records into a session total with
/// [`Usage::fold`] on a fresh copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default, alias = "cache_read_input_tokens")]
    pub cache_read_tokens: u64,
    #[serde(default, alias = "cache_creation_input_tokens")]
    pub cache_creation_tokens: u64,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default = "default_context_window")]
    pub context_window: u64,
}

impl Default for Usage {
    fn default() -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
            cache_creation_tokens: 0,
            cost_usd: 0.0,
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

impl Usage {
    /// True when no input or output tokens were counted.
    pub fn is_empty(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }

    /// Fold another record into this one: token fields sum, cost sums,
    /// and the widest context window wins.
    pub fn fold(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_creation_tokens += other.cache_creation_tokens;
        self.cost_usd += other.cost_usd;
        self.context_window = self.context_window.max(other.context_window);
    }
}

/// Per-model usage entry, as reported by agents that split accounting by
/// sub-model within one session.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default, alias = "cacheReadInputTokens")]
    pub cache_read_tokens: u64,
    #[serde(default, alias = "cacheCreationInputTokens")]
    pub cache_creation_tokens: u64,
    #[serde(default)]
    pub context_window: Option<u64>,
}

/// Collapse a per-model usage map and an optional flat legacy object into
/// one aggregate record.
///
/// Token and cache fields are summed across models. The context window is
/// the maximum reported by any model (the most permissive applicable
/// window), falling back to [`DEFAULT_CONTEXT_WINDOW`] when no model
/// reports one. `cost_usd` is taken from the legacy object unmodified -
/// agents report it as a session total, never per model.
///
/// A per-model map whose input and output tokens sum to zero is treated
/// as absent, not as zero usage: some agent versions omit the breakdown
/// but still fill in the flat total, so in that case the legacy object
/// wins wholesale.
pub fn aggregate_usage(per_model: &HashMap<String, ModelUsage>, legacy: Option<&Usage>) -> Usage {
    let mut total = Usage::default();
    let mut max_window: Option<u64> = None;

    for model in per_model.values() {
        total.input_tokens += model.input_tokens;
        total.output_tokens += model.output_tokens;
        total.cache_read_tokens += model.cache_read_tokens;
        total.cache_creation_tokens += model.cache_creation_tokens;
        if let Some(window) = model.context_window {
            max_window = Some(max_window.map_or(window, |w| w.max(window)));
        }
    }

    if total.is_empty() {
        if let Some(flat) = legacy {
            return flat.clone();
        }
        return total;
    }

    total.cost_usd = legacy.map(|u| u.cost_usd).unwrap_or(0.0);
    total.context_window = max_window.unwrap_or(DEFAULT_CONTEXT_WINDOW);
    total
}
