//! Protocol dispatcher.
//!
//! Maps decoded protocol events to consumer-facing [`SessionEvent`]s.
//! One dispatcher lives per subprocess invocation (one turn): it carries
//! the streaming-assistant assembler state, suppresses duplicate text
//! chunks, extracts tool traffic, and reconciles the session id reported
//! by the agent against the id the caller requested.

use agentdeck_protocol::{SessionEvent, TodoItem};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::decode::ProtocolEvent;

/// Tool name that carries the structured todo list in its input.
const TODO_TOOL: &str = "TodoWrite";

/// Assembler state for one in-flight assistant reply.
struct StreamingMessage {
    id: String,
}

pub struct Dispatcher {
    session_id: Option<String>,
    streaming: Option<StreamingMessage>,
    last_assistant_text: String,
    msg_counter: u64,
}

impl Dispatcher {
    /// `session_id` is the caller's current belief; the agent may override
    /// it via the init event.
    pub fn new(session_id: Option<String>) -> Self {
        // Seeded from epoch millis so ids never collide across turns.
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            session_id,
            streaming: None,
            last_assistant_text: String::new(),
            msg_counter: seed,
        }
    }

    /// The id currently believed canonical (post-reconciliation).
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Dispatch one decoded event into zero or more consumer events,
    /// strictly in source order.
    pub fn dispatch(&mut self, event: ProtocolEvent) -> Vec<SessionEvent> {
        match event {
            ProtocolEvent::SystemInit {
                session_id,
                model,
                tools,
                cwd,
            } => self.on_init(session_id, model, tools, cwd),
            ProtocolEvent::SystemUsage(usage) => vec![SessionEvent::TokensUpdated { usage }],
            ProtocolEvent::UserEcho { blocks } => self.on_user_echo(&blocks),
            ProtocolEvent::AssistantChunk {
                model,
                usage,
                blocks,
            } => self.on_assistant_chunk(model, usage, &blocks),
            ProtocolEvent::ToolUse { name, input } => {
                let id = self.next_id("tool-use");
                vec![SessionEvent::ToolUse {
                    id,
                    name: name.unwrap_or_else(|| "unknown".into()),
                    input,
                }]
            }
            ProtocolEvent::ToolResult { name, output } => {
                let id = self.next_id("tool-result");
                vec![SessionEvent::ToolResult {
                    id,
                    name,
                    content: output.as_ref().map(stringify).unwrap_or_default(),
                    tool_use_id: None,
                    is_error: false,
                }]
            }
            ProtocolEvent::TurnResult { usage } => usage
                .map(|usage| vec![SessionEvent::TokensUpdated { usage }])
                .unwrap_or_default(),
            ProtocolEvent::Error { message } => vec![SessionEvent::Error { message }],
            ProtocolEvent::Unrecognized { raw } => {
                debug!(
                    component = "dispatcher",
                    event = "dispatch.unrecognized",
                    msg_type = %raw.get("type").and_then(|v| v.as_str()).unwrap_or("?"),
                    "Ignoring unrecognized protocol object"
                );
                vec![]
            }
        }
    }

    /// Terminal signal from the process supervisor: finalize any open
    /// streaming message.
    pub fn finish(&mut self) -> Vec<SessionEvent> {
        match self.streaming.take() {
            Some(streaming) => vec![SessionEvent::AssistantFinalized { id: streaming.id }],
            None => vec![],
        }
    }

    fn on_init(
        &mut self,
        agent_id: Option<String>,
        model: Option<String>,
        tools: Vec<String>,
        cwd: Option<String>,
    ) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        if let Some(new_id) = agent_id.clone() {
            if self.session_id.as_deref() != Some(new_id.as_str()) {
                let old_id = self.session_id.clone().unwrap_or_default();
                if !old_id.is_empty() {
                    // Downstream consumers re-key their per-session indexes
                    // on this signal.
                    warn!(
                        component = "dispatcher",
                        event = "dispatch.session_id_changed",
                        old_id = %old_id,
                        new_id = %new_id,
                        "Agent reported a different session id; adopting it"
                    );
                }
                self.session_id = Some(new_id.clone());
                events.push(SessionEvent::SessionIdChanged { old_id, new_id });
            } else {
                info!(
                    component = "dispatcher",
                    event = "dispatch.session_id_confirmed",
                    session_id = %new_id,
                    "Agent confirmed our session id"
                );
            }
        }

        events.push(SessionEvent::SystemInfo {
            session_id: agent_id,
            model,
            tools,
            cwd,
        });
        events
    }

    /// Echoed user messages can wrap tool traffic; re-emit each nested
    /// item as its own discrete event, independent of the outer echo.
    fn on_user_echo(&mut self, blocks: &[Value]) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        for block in blocks.iter().filter(|b| block_type(b) == "tool_result") {
            let id = self.next_id("tool-result");
            events.push(SessionEvent::ToolResult {
                id,
                name: None,
                content: block.get("content").map(stringify).unwrap_or_default(),
                tool_use_id: block
                    .get("tool_use_id")
                    .and_then(|v| v.as_str())
                    .map(String::from),
                is_error: block
                    .get("is_error")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
            });
        }

        for block in blocks.iter().filter(|b| block_type(b) == "tool_use") {
            events.push(self.tool_use_from_block(block));
        }

        events
    }

    fn on_assistant_chunk(
        &mut self,
        model: Option<String>,
        usage: Option<agentdeck_protocol::TokenUsage>,
        blocks: &[Value],
    ) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        // Thinking text is emitted immediately and unconditionally.
        let thinking: String = blocks
            .iter()
            .filter(|b| block_type(b) == "thinking")
            .filter_map(|b| {
                b.get("thinking")
                    .or_else(|| b.get("text"))
                    .and_then(|v| v.as_str())
            })
            .collect();
        if !thinking.is_empty() {
            let id = self.next_id("thinking");
            events.push(SessionEvent::Thinking {
                id,
                content: thinking,
                model: model.clone(),
            });
        }

        for block in blocks.iter().filter(|b| block_type(b) == "tool_use") {
            events.push(self.tool_use_from_block(block));
            if block.get("name").and_then(|v| v.as_str()) == Some(TODO_TOOL) {
                if let Some(todos) = block
                    .pointer("/input/todos")
                    .and_then(|v| serde_json::from_value::<Vec<TodoItem>>(v.clone()).ok())
                {
                    events.push(SessionEvent::TodoUpdated { todos });
                }
            }
        }

        let text: String = blocks
            .iter()
            .filter(|b| block_type(b) == "text")
            .filter_map(|b| b.get("text").and_then(|v| v.as_str()))
            .collect();

        // The agent resends the whole accumulated reply each chunk;
        // identical consecutive text collapses to nothing.
        if !text.is_empty() && text != self.last_assistant_text {
            self.last_assistant_text = text.clone();

            match &self.streaming {
                None => {
                    let id = self.next_id("msg");
                    self.streaming = Some(StreamingMessage { id: id.clone() });
                    events.push(SessionEvent::AssistantStarted {
                        id,
                        content: text,
                        model,
                        usage: usage.clone(),
                    });
                }
                Some(streaming) => {
                    events.push(SessionEvent::AssistantUpdated {
                        id: streaming.id.clone(),
                        content: text,
                        model,
                        usage: usage.clone(),
                    });
                }
            }

            if let Some(usage) = usage {
                events.push(SessionEvent::TokensUpdated { usage });
            }
        }

        events
    }

    fn tool_use_from_block(&mut self, block: &Value) -> SessionEvent {
        let id = self.next_id("tool-use");
        SessionEvent::ToolUse {
            id,
            name: block
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            input: block.get("input").cloned(),
        }
    }

    fn next_id(&mut self, kind: &str) -> String {
        let sid = self.session_id.as_deref().unwrap_or("unknown");
        // Ids are arbitrary strings; take characters, not bytes.
        let prefix: String = sid.chars().take(8).collect();
        let n = self.msg_counter;
        self.msg_counter += 1;
        format!("{kind}-{prefix}-{n}")
    }
}

fn block_type(block: &Value) -> &str {
    block.get("type").and_then(|v| v.as_str()).unwrap_or("")
}

/// Tool payloads may be plain strings or structured JSON.
fn stringify(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}
