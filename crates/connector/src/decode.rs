//! Event decoding for protocol lines.
//!
//! Each complete line is parsed as JSON and classified by its `type` (and
//! `subtype`) field into a [`ProtocolEvent`]. A line that is not JSON is
//! checked against a plain-text error heuristic and otherwise discarded at
//! trace level.

use agentdeck_protocol::TokenUsage;
use serde_json::Value;
use tracing::trace;

/// One decoded protocol line, tagged by the agent's `type` field.
#[derive(Debug, Clone)]
pub enum ProtocolEvent {
    SystemInit {
        session_id: Option<String>,
        model: Option<String>,
        tools: Vec<String>,
        cwd: Option<String>,
    },
    SystemUsage(TokenUsage),
    /// Echoed user message; may wrap tool_result/tool_use content blocks.
    UserEcho {
        blocks: Vec<Value>,
    },
    /// One assistant message snapshot (full accumulated reply, not a delta).
    AssistantChunk {
        model: Option<String>,
        usage: Option<TokenUsage>,
        blocks: Vec<Value>,
    },
    ToolUse {
        name: Option<String>,
        input: Option<Value>,
    },
    ToolResult {
        name: Option<String>,
        output: Option<Value>,
    },
    TurnResult {
        usage: Option<TokenUsage>,
    },
    Error {
        message: String,
    },
    Unrecognized {
        raw: Value,
    },
}

/// Outcome of decoding one framed line.
#[derive(Debug)]
pub struct DecodedLine {
    pub event: ProtocolEvent,
    /// The parsed JSON object, when the line was valid JSON. Used for the
    /// per-session debug log.
    pub parsed: Option<Value>,
}

/// Decode one line. Returns `None` for blank lines and for non-JSON lines
/// that do not match the error heuristic.
pub fn decode_line(line: &str) -> Option<DecodedLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(line) {
        Ok(value) => {
            let event = classify(&value);
            Some(DecodedLine {
                event,
                parsed: Some(value),
            })
        }
        Err(_) if line.contains("Error:") => Some(DecodedLine {
            event: ProtocolEvent::Error {
                message: line.to_string(),
            },
            parsed: None,
        }),
        Err(_) => {
            trace!(
                component = "decoder",
                event = "decode.non_json_line",
                line_preview = %preview(line),
                "Discarding non-JSON output line"
            );
            None
        }
    }
}

/// Classify a parsed JSON object into a [`ProtocolEvent`].
pub fn classify(raw: &Value) -> ProtocolEvent {
    let msg_type = raw.get("type").and_then(|v| v.as_str()).unwrap_or("");

    match msg_type {
        "system" => classify_system(raw),
        "user" => ProtocolEvent::UserEcho {
            blocks: content_blocks(raw),
        },
        "assistant" => ProtocolEvent::AssistantChunk {
            model: raw
                .pointer("/message/model")
                .and_then(|v| v.as_str())
                .map(String::from),
            usage: raw.pointer("/message/usage").and_then(usage_from),
            blocks: content_blocks(raw),
        },
        "tool_use" => ProtocolEvent::ToolUse {
            name: raw
                .get("tool_name")
                .and_then(|v| v.as_str())
                .map(String::from),
            input: raw.get("tool_input").cloned(),
        },
        "tool_result" => ProtocolEvent::ToolResult {
            name: raw
                .get("tool_name")
                .and_then(|v| v.as_str())
                .map(String::from),
            output: raw.get("tool_result").cloned(),
        },
        "result" => ProtocolEvent::TurnResult {
            usage: raw.get("usage").and_then(usage_from),
        },
        "error" => ProtocolEvent::Error {
            message: raw
                .get("error")
                .or_else(|| raw.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown error")
                .to_string(),
        },
        _ => ProtocolEvent::Unrecognized { raw: raw.clone() },
    }
}

fn classify_system(raw: &Value) -> ProtocolEvent {
    let subtype = raw.get("subtype").and_then(|v| v.as_str()).unwrap_or("");
    match subtype {
        "init" => ProtocolEvent::SystemInit {
            session_id: raw
                .get("session_id")
                .and_then(|v| v.as_str())
                .map(String::from),
            model: raw.get("model").and_then(|v| v.as_str()).map(String::from),
            tools: raw
                .get("tools")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default(),
            cwd: raw.get("cwd").and_then(|v| v.as_str()).map(String::from),
        },
        // Usage counts sit at the top level of the system message.
        "usage" => ProtocolEvent::SystemUsage(usage_from(raw).unwrap_or_default()),
        _ => ProtocolEvent::Unrecognized { raw: raw.clone() },
    }
}

/// Pull `message.content` as a block array, tolerating absence.
fn content_blocks(raw: &Value) -> Vec<Value> {
    raw.pointer("/message/content")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Deserialize a usage object; unknown fields ignored, missing ones zero.
fn usage_from(value: &Value) -> Option<TokenUsage> {
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}

fn preview(line: &str) -> &str {
    let end = (0..=100.min(line.len()))
        .rev()
        .find(|&i| line.is_char_boundary(i))
        .unwrap_or(0);
    &line[..end]
}
