//! Per-session append-only debug log.
//!
//! Every raw chunk and every successfully parsed protocol object is
//! appended as one NDJSON record of the shape `{timestamp, raw}` or
//! `{timestamp, parsed}` (user prompts as `{timestamp, prompt, turn}`).
//! Consecutive identical payloads are written once; the underlying tool
//! echoes duplicates noisily. Consumers reconstruct a session transcript
//! by replaying the file. Write failures never propagate.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tracing::debug;

const LOG_DIR_NAME: &str = ".agentdeck";

/// Append-only NDJSON log, one file per session.
pub struct DebugLog {
    dir: PathBuf,
    last_payload: Option<String>,
}

impl DebugLog {
    pub fn new(working_dir: &Path) -> Self {
        Self {
            dir: working_dir.join(LOG_DIR_NAME),
            last_payload: None,
        }
    }

    pub fn set_working_dir(&mut self, working_dir: &Path) {
        self.dir = working_dir.join(LOG_DIR_NAME);
    }

    /// Log file path for a given session id.
    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("session-{session_id}.ndjson"))
    }

    /// Append a raw output chunk.
    pub async fn append_raw(&mut self, session_id: &str, chunk: &str) {
        self.append(session_id, chunk.to_string(), json!({ "raw": chunk }))
            .await;
    }

    /// Append a successfully parsed protocol object.
    pub async fn append_parsed(&mut self, session_id: &str, parsed: &Value) {
        self.append(
            session_id,
            parsed.to_string(),
            json!({ "parsed": parsed }),
        )
        .await;
    }

    /// Append the raw user prompt that opened a turn.
    pub async fn append_prompt(&mut self, session_id: &str, prompt: &str, turn: u32) {
        self.append(
            session_id,
            format!("prompt:{turn}:{prompt}"),
            json!({ "prompt": prompt, "turn": turn }),
        )
        .await;
    }

    async fn append(&mut self, session_id: &str, payload_key: String, mut record: Value) {
        // Identical back-to-back payloads are suppressed.
        if self.last_payload.as_deref() == Some(payload_key.as_str()) {
            return;
        }
        self.last_payload = Some(payload_key);

        record["timestamp"] = json!(epoch_millis());
        let mut line = record.to_string();
        line.push('\n');

        if let Err(e) = self.write_line(session_id, &line).await {
            debug!(
                component = "debug_log",
                event = "debug_log.write_failed",
                session_id = %session_id,
                error = %e,
                "Failed to append debug log record"
            );
        }
    }

    async fn write_line(&self, session_id: &str, line: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(session_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
