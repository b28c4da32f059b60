//! Outbound `sessionUpdate` payloads and turn results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::tool::ToolDefinition;

/// Error code reported when the backend blocks a response on safety grounds.
pub const SAFETY_BLOCK: &str = "SAFETY_BLOCK";

/// Why a turn stopped generating.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The model finished its answer.
    EndTurn,
    /// The model is waiting for tool results.
    ToolUse,
    /// The output token limit was reached.
    MaxTokens,
    /// A configured stop sequence was produced.
    StopSequence,
    /// Generation ended because of an error.
    Error,
}

/// One incremental update pushed to the client during a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SessionUpdate {
    /// A fragment of visible assistant text.
    AgentMessageChunk {
        /// Identifier shared by every message chunk of one turn.
        message_id: String,
        /// Position of this chunk among the turn's message chunks.
        index: u64,
        /// Text fragment.
        chunk: String,
    },
    /// A fragment of model reasoning.
    AgentThoughtChunk {
        /// Identifier shared by every thought chunk of one turn.
        thought_id: String,
        /// Position of this chunk among the turn's thought chunks.
        index: u64,
        /// Text fragment.
        chunk: String,
    },
    /// The model asked the client to run a tool.
    ToolCall {
        /// Call identifier the client must echo back in `toolResult`.
        call_id: String,
        /// Resolved tool definition.
        tool: ToolDefinition,
        /// Structured arguments.
        input: Value,
    },
    /// Generation stopped.
    SessionComplete {
        /// Stop reason.
        reason: CompletionReason,
    },
    /// Generation failed.
    SessionError {
        /// Machine-readable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

/// A tool call the client must execute before the conversation continues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingToolCall {
    /// Call identifier.
    pub call_id: String,
    /// Tool name.
    pub tool_name: String,
}

/// Result of one prompt or tool-result turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnResult {
    /// Tool calls awaiting execution; omitted when generation finished.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<PendingToolCall>,
}
