//! Agentdeck Protocol
//!
//! Shared types for communication between the Agentdeck session host and
//! its clients. These types are serialized as newline-delimited JSON at the
//! transport boundary.

pub mod client;
pub mod server;
pub mod types;

pub use client::ClientCommand;
pub use server::SessionEvent;
pub use types::{SessionStatus, TodoItem, TokenUsage};
