//! Core types shared across the protocol

use serde::{Deserialize, Serialize};

/// Cumulative token usage as reported by the agent.
///
/// The agent reports context-wide totals, not deltas, so a new snapshot
/// always replaces the previous one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

impl TokenUsage {
    /// Total tokens counted against the context window.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Cache hit percentage of the input side.
    pub fn cache_hit_percent(&self) -> f64 {
        if self.input_tokens == 0 {
            return 0.0;
        }
        (self.cache_read_input_tokens as f64 / self.input_tokens as f64) * 100.0
    }
}

/// One entry of the agent's todo list, carried by the todo-list tool input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    pub status: String,
    #[serde(rename = "activeForm", skip_serializing_if = "Option::is_none")]
    pub active_form: Option<String>,
}

/// Snapshot of a session's lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub active: bool,
    pub session_id: Option<String>,
    pub processing: bool,
}
