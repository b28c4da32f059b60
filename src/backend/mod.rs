//! Model backend and credential capabilities.
//!
//! The [`ModelBackend`] trait decouples turn orchestration from the HTTP
//! transport that talks to the generative language API, and
//! [`CredentialProvider`] decouples it from where bearer tokens come from.
//! Both are object-safe so the front-end can hold them as `Arc<dyn …>`.

pub mod credentials;
pub mod gemini;

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::models::content::Content;
use crate::models::tool::ToolDefinition;
use crate::Result;

/// Incremental response stream of one backend call.
pub type EventStream = BoxStream<'static, Result<GenerateChunk>>;

/// Everything the backend needs for one streaming call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    /// Model variant bound at session creation.
    pub model: String,
    /// Full session history, in order.
    pub contents: Vec<Content>,
    /// Optional static system instruction.
    pub system_instruction: Option<String>,
    /// Effective tool catalogue.
    pub tools: Vec<ToolDefinition>,
}

/// Why the backend stopped generating a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FinishReason {
    /// Natural stop.
    Stop,
    /// The model wants tool results before continuing.
    ToolUse,
    /// The response was blocked by safety filters.
    Safety,
    /// Output token limit reached.
    MaxTokens,
    /// Any marker this bridge does not translate.
    Other(String),
}

impl From<String> for FinishReason {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "STOP" => Self::Stop,
            "TOOL_USE" | "TOOL_CALLS" => Self::ToolUse,
            "SAFETY" => Self::Safety,
            "MAX_TOKENS" => Self::MaxTokens,
            _ => Self::Other(raw),
        }
    }
}

impl From<FinishReason> for String {
    fn from(reason: FinishReason) -> Self {
        match reason {
            FinishReason::Stop => "STOP".into(),
            FinishReason::ToolUse => "TOOL_USE".into(),
            FinishReason::Safety => "SAFETY".into(),
            FinishReason::MaxTokens => "MAX_TOKENS".into(),
            FinishReason::Other(raw) => raw,
        }
    }
}

/// One alternative generation inside a stream chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Content produced in this chunk, if any.
    #[serde(default)]
    pub content: Option<Content>,
    /// Finish marker, present on the last chunk of the candidate.
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// One event of a backend stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateChunk {
    /// Candidates carried by this event; usually exactly one.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// Streaming chat-completion capability.
pub trait ModelBackend: Send + Sync {
    /// Start a streaming generation call.
    ///
    /// The returned stream is consumed to completion by the caller. `cancel`
    /// fires when the owning session's turn is cancelled; implementations
    /// should abandon any pending connect or read as soon as it does.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Backend`](crate::AppError::Backend) if the call
    /// cannot be started, or [`AppError::Cancelled`](crate::AppError::Cancelled)
    /// if `cancel` fires first.
    fn stream_generate(
        &self,
        request: GenerateRequest,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream>> + Send + '_>>;
}

/// Source of bearer tokens for the backend.
pub trait CredentialProvider: Send + Sync {
    /// Return a currently valid token, refreshing it if it is stale.
    /// `Ok(None)` means no credentials are configured.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`](crate::AppError::Config) if a credential
    /// source fails in a way other than "not present".
    fn valid_token(&self) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + '_>>;
}
