//! Backend stream → `sessionUpdate` translation.
//!
//! A [`StreamTranslator`] lives for exactly one turn. It is synchronous and
//! performs no I/O; the orchestrator feeds it one [`GenerateChunk`] at a time
//! and forwards the returned updates in order.
//!
//! | backend finish marker | update                               |
//! |-----------------------|--------------------------------------|
//! | `STOP`                | `session_complete` / `end_turn`      |
//! | tool use              | `session_complete` / `tool_use`      |
//! | `SAFETY`              | `session_error` / `SAFETY_BLOCK`     |
//! | `MAX_TOKENS`          | `session_complete` / `max_tokens`    |
//! | anything else         | none                                 |

use uuid::Uuid;

use crate::backend::{Candidate, FinishReason, GenerateChunk};
use crate::models::content::{FunctionCall, Part};
use crate::models::tool::{resolve_tool, ToolDefinition};
use crate::models::update::{CompletionReason, SessionUpdate, SAFETY_BLOCK};

/// Per-turn translation state.
#[derive(Debug)]
pub struct StreamTranslator {
    catalogue: Vec<ToolDefinition>,
    message_id: String,
    thought_id: String,
    message_index: u64,
    thought_index: u64,
    text: String,
    last_call_id: Option<String>,
}

impl StreamTranslator {
    /// Start a translator that resolves tool calls against `catalogue`.
    #[must_use]
    pub fn new(catalogue: Vec<ToolDefinition>) -> Self {
        Self {
            catalogue,
            message_id: format!("msg_{}", Uuid::new_v4().simple()),
            thought_id: format!("thought_{}", Uuid::new_v4().simple()),
            message_index: 0,
            thought_index: 0,
            text: String::new(),
            last_call_id: None,
        }
    }

    /// Translate one backend event into zero or more ordered updates.
    ///
    /// Candidates are processed in order and their updates flattened.
    pub fn translate(&mut self, chunk: GenerateChunk) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        for candidate in chunk.candidates {
            self.translate_candidate(candidate, &mut updates);
        }
        updates
    }

    /// Plain text accumulated so far this turn; thoughts are excluded.
    #[must_use]
    pub fn accumulated_text(&self) -> &str {
        &self.text
    }

    /// Identifier of the most recent tool call seen this turn.
    #[must_use]
    pub fn last_call_id(&self) -> Option<&str> {
        self.last_call_id.as_deref()
    }

    fn translate_candidate(&mut self, candidate: Candidate, updates: &mut Vec<SessionUpdate>) {
        if let Some(content) = candidate.content {
            for part in content.parts {
                if let Some(update) = self.translate_part(part) {
                    updates.push(update);
                }
            }
        }

        if let Some(update) = candidate.finish_reason.and_then(terminal_update) {
            updates.push(update);
        }
    }

    fn translate_part(&mut self, part: Part) -> Option<SessionUpdate> {
        match part {
            Part::Thought(chunk) => {
                let index = self.thought_index;
                self.thought_index += 1;
                Some(SessionUpdate::AgentThoughtChunk {
                    thought_id: self.thought_id.clone(),
                    index,
                    chunk,
                })
            }
            Part::Text(chunk) => {
                self.text.push_str(&chunk);
                let index = self.message_index;
                self.message_index += 1;
                Some(SessionUpdate::AgentMessageChunk {
                    message_id: self.message_id.clone(),
                    index,
                    chunk,
                })
            }
            Part::FunctionCall(call) => Some(self.translate_call(call)),
            // Tool results only ever flow client → backend.
            Part::FunctionResponse(_) => None,
        }
    }

    fn translate_call(&mut self, call: FunctionCall) -> SessionUpdate {
        let call_id = call
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
        self.last_call_id = Some(call_id.clone());

        SessionUpdate::ToolCall {
            call_id,
            tool: resolve_tool(&self.catalogue, &call.name),
            input: call.args,
        }
    }
}

fn terminal_update(reason: FinishReason) -> Option<SessionUpdate> {
    let reason = match reason {
        FinishReason::Stop => CompletionReason::EndTurn,
        FinishReason::ToolUse => CompletionReason::ToolUse,
        FinishReason::MaxTokens => CompletionReason::MaxTokens,
        FinishReason::Safety => {
            return Some(SessionUpdate::SessionError {
                code: SAFETY_BLOCK.into(),
                message: "response blocked by the backend's safety filters".into(),
            })
        }
        FinishReason::Other(_) => return None,
    };
    Some(SessionUpdate::SessionComplete { reason })
}
