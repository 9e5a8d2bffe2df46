//! Agentdeck Connector
//!
//! Gives the illusion of a persistent, stateful conversation with the
//! external agent CLI, which is itself stateless per invocation. A fresh
//! subprocess is spawned for every user turn; continuity is preserved by
//! choosing invocation flags from accumulated session state, and the
//! subprocess's newline-delimited JSON output is incrementally parsed into
//! a typed, de-duplicated event stream.

pub mod args;
pub mod command;
pub mod debug_log;
pub mod decode;
pub mod dispatch;
pub mod framing;
pub mod session;
pub mod shadow;

pub use args::ContinuityMode;
pub use session::SessionManager;
pub use shadow::ShadowTask;

use thiserror::Error;

/// Errors that can occur in the connector.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("no active session")]
    NoActiveSession,

    #[error("failed to spawn agent process: {0}")]
    Spawn(String),

    #[error("process communication error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event channel closed")]
    ChannelClosed,

    #[error("agent reported error: {0}")]
    AgentError(String),

    #[error("summarization timed out after {0}s")]
    SummaryTimeout(u64),

    #[error("summarization produced no text")]
    SummaryEmpty,
}
