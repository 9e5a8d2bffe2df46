//! Client → Server commands

use serde::{Deserialize, Serialize};

/// Commands sent from a client to the session host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Create or attach to a session.
    Start {
        #[serde(skip_serializing_if = "Option::is_none")]
        working_dir: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default)]
        new_session: bool,
    },

    /// Submit one user prompt (one turn).
    Prompt { text: String },

    /// Kill the in-flight turn but keep the session.
    Interrupt,

    /// Tear the session down entirely.
    Stop,

    /// Run a one-shot shadow summarization, independent of the session.
    Summarize { conversation: String },

    /// Request a status snapshot.
    Status,
}
