//! Server → Client events
//!
//! The transport layer forwards these in order, with no reordering or
//! filtering. All events derived from a single subprocess are emitted in
//! the order their source lines were read.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{SessionStatus, TodoItem, TokenUsage};

/// Events emitted by a session toward its clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    // Lifecycle
    SessionStarted {
        session_id: String,
    },
    /// The session is idle and ready for the next prompt.
    Ready,
    /// The agent reported a canonical id different from ours. Consumers
    /// must re-key any per-session indexes on this signal.
    SessionIdChanged {
        old_id: String,
        new_id: String,
    },
    /// The in-flight subprocess was terminated without finishing its turn.
    ProcessStopped {
        reason: String,
    },

    // Agent metadata
    SystemInfo {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tools: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
    },
    /// Cumulative token usage snapshot; replaces any previous total.
    TokensUpdated {
        usage: TokenUsage,
    },

    // Chat stream
    AssistantStarted {
        id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
    /// Replacement text for an in-flight assistant message (the agent
    /// resends the whole accumulated reply each chunk).
    AssistantUpdated {
        id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
    AssistantFinalized {
        id: String,
    },
    Thinking {
        id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    ToolResult {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<String>,
        #[serde(default)]
        is_error: bool,
    },
    TodoUpdated {
        todos: Vec<TodoItem>,
    },

    // Shadow task
    SummaryReady {
        summary: String,
    },

    // Status & errors
    Status {
        status: SessionStatus,
    },
    Error {
        message: String,
    },
}
