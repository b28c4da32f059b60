//! Conversation content exchanged with the model backend.
//!
//! The backend distinguishes part kinds by which fields are present
//! (`text`, `thought`, `functionCall`, `functionResponse`). That shape is
//! confined to [`RawPart`]; everything past the serde boundary works with the
//! tagged [`Part`] enum. Parts of any other kind (inline data, executable
//! code, bare thought signatures) are dropped when a [`Content`] is read.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Author of a conversation element.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Text typed by the user or tool results returned by the client.
    User,
    /// Output produced by the model.
    #[default]
    Model,
}

/// One element of a session's history, also the unit streamed back by the
/// backend inside each candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    /// Element author. Stream chunks may omit it, in which case it is `model`.
    #[serde(default)]
    pub role: Role,
    /// Ordered sub-parts of this element.
    #[serde(default, deserialize_with = "supported_parts")]
    pub parts: Vec<Part>,
}

fn supported_parts<'de, D>(deserializer: D) -> Result<Vec<Part>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<RawPart>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|raw| match Part::try_from(raw) {
            Ok(part) => Some(part),
            Err(reason) => {
                warn!(%reason, "skipping unsupported content part");
                None
            }
        })
        .collect())
}

impl Content {
    /// Build a user element holding a single text part.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Build a model element holding a single text part.
    #[must_use]
    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Whether every sub-part is plain text.
    #[must_use]
    pub fn is_text_only(&self) -> bool {
        self.parts.iter().all(|part| matches!(part, Part::Text(_)))
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    /// Backend-assigned call identifier, if the backend supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool name.
    pub name: String,
    /// Structured arguments.
    #[serde(default)]
    pub args: Value,
}

/// The client's answer to a [`FunctionCall`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResponse {
    /// Identifier of the originating call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool name.
    pub name: String,
    /// Structured tool output.
    pub response: Value,
}

/// One sub-part of a [`Content`] element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPart", into = "RawPart")]
pub enum Part {
    /// Plain text.
    Text(String),
    /// Reasoning text marked as a thought by the backend.
    Thought(String),
    /// Tool invocation.
    FunctionCall(FunctionCall),
    /// Tool result.
    FunctionResponse(FunctionResponse),
}

/// Field-presence wire shape of a part.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl TryFrom<RawPart> for Part {
    type Error = String;

    fn try_from(raw: RawPart) -> std::result::Result<Self, Self::Error> {
        if let Some(call) = raw.function_call {
            return Ok(Self::FunctionCall(call));
        }
        if let Some(response) = raw.function_response {
            return Ok(Self::FunctionResponse(response));
        }
        match (raw.text, raw.thought.unwrap_or(false)) {
            (Some(text), true) => Ok(Self::Thought(text)),
            (Some(text), false) => Ok(Self::Text(text)),
            (None, _) => Err("part carries no text, functionCall, or functionResponse".into()),
        }
    }
}

impl From<Part> for RawPart {
    fn from(part: Part) -> Self {
        match part {
            Part::Text(text) => Self {
                text: Some(text),
                ..Self::default()
            },
            Part::Thought(text) => Self {
                text: Some(text),
                thought: Some(true),
                ..Self::default()
            },
            Part::FunctionCall(call) => Self {
                function_call: Some(call),
                ..Self::default()
            },
            Part::FunctionResponse(response) => Self {
                function_response: Some(response),
                ..Self::default()
            },
        }
    }
}
