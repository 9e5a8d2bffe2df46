//! Shadow task runner.
//!
//! One-shot, time-boxed agent invocations for auxiliary work, completely
//! decoupled from any session's active subprocess. Used for conversation
//! summarization.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::ChildStdout;
use tracing::{debug, info};

use crate::args::shadow_args;
use crate::command::{resolve_agent_binary, spawn_agent};
use crate::decode::{decode_line, ProtocolEvent};
use crate::framing::LineFramer;
use crate::ConnectorError;

/// Hard wall-clock limit for one summarization run.
pub const DEFAULT_SUMMARY_TIMEOUT: Duration = Duration::from_secs(60);

/// A configured shadow invocation.
pub struct ShadowTask {
    working_dir: PathBuf,
    binary: Option<PathBuf>,
    timeout: Duration,
}

impl ShadowTask {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            binary: None,
            timeout: DEFAULT_SUMMARY_TIMEOUT,
        }
    }

    /// Override agent binary resolution (tests, packaged installs).
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Summarize a conversation via a single-shot subprocess. Accumulates
    /// only plain assistant text; tool and system events are ignored. The
    /// timeout is unconditional once it fires, regardless of in-flight I/O.
    pub async fn summarize(&self, conversation: &str) -> Result<String, ConnectorError> {
        info!(
            component = "shadow",
            event = "shadow.summarize.start",
            conversation_len = conversation.len(),
            "Starting shadow summarization"
        );

        let binary = match &self.binary {
            Some(b) => b.clone(),
            None => resolve_agent_binary()?,
        };
        let prompt = summary_prompt(conversation);
        let args = shadow_args(&prompt);

        let mut child = spawn_agent(&binary, &args, &self.working_dir)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConnectorError::Spawn("no stdout on child".into()))?;

        let summary = match tokio::time::timeout(self.timeout, collect_summary(stdout)).await {
            Err(_) => {
                let _ = child.start_kill();
                info!(
                    component = "shadow",
                    event = "shadow.summarize.timeout",
                    timeout_secs = self.timeout.as_secs(),
                    "Shadow summarization timed out"
                );
                return Err(ConnectorError::SummaryTimeout(self.timeout.as_secs()));
            }
            Ok(Err(e)) => {
                let _ = child.start_kill();
                return Err(e);
            }
            Ok(Ok(summary)) => summary,
        };

        let status = child.wait().await?;
        debug!(
            component = "shadow",
            event = "shadow.summarize.exited",
            exit_status = %status,
            summary_len = summary.len(),
            "Shadow subprocess exited"
        );

        if summary.is_empty() {
            return Err(ConnectorError::SummaryEmpty);
        }
        Ok(summary)
    }
}

/// Read the shadow stream to EOF, keeping only assistant text. An explicit
/// error event aborts the run.
async fn collect_summary(mut stdout: ChildStdout) -> Result<String, ConnectorError> {
    let mut framer = LineFramer::new();
    let mut buf = [0u8; 8192];
    let mut texts: Vec<String> = Vec::new();

    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                for line in framer.push(&chunk) {
                    accumulate_line(&line, &mut texts)?;
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    if let Some(rest) = framer.finish() {
        accumulate_line(&rest, &mut texts)?;
    }

    Ok(texts.concat())
}

fn accumulate_line(line: &str, texts: &mut Vec<String>) -> Result<(), ConnectorError> {
    let Some(decoded) = decode_line(line) else {
        return Ok(());
    };
    match decoded.event {
        ProtocolEvent::AssistantChunk { blocks, .. } => {
            let text: String = blocks
                .iter()
                .filter(|b| b.get("type").and_then(|v| v.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|v| v.as_str()))
                .collect();
            // The agent may resend an identical chunk; keep one copy.
            if !text.is_empty() && texts.last().map(String::as_str) != Some(text.as_str()) {
                texts.push(text);
            }
        }
        ProtocolEvent::Error { message } => return Err(ConnectorError::AgentError(message)),
        _ => {}
    }
    Ok(())
}

/// The summarization instructions handed to the shadow subprocess as its
/// sole input.
fn summary_prompt(conversation: &str) -> String {
    format!(
        "You are being asked to summarize a conversation between a user and a \
coding agent.\nPlease provide a concise summary of the conversation, focusing on:\n\
1. The main task or problem being worked on\n\
2. Key decisions and solutions implemented\n\
3. Current status and any unresolved issues\n\
4. Important context that should be preserved\n\n\
Keep the summary focused and under 500 words. Format it as if you're continuing \
the conversation.\n\n\
Here is the conversation to summarize:\n\n{conversation}\n\n\
Please provide a clear, concise summary that captures the essence of this conversation:"
    )
}
