//! Session model and creation parameters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::content::Content;
use super::tool::ToolDefinition;

/// Overrides requested by a `newSession` call. Absent fields fall back to the
/// process defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Backend model variant.
    #[serde(default)]
    pub model: Option<String>,
    /// Static system instruction.
    #[serde(default)]
    pub system_instruction: Option<String>,
    /// Session-specific tool catalogue; empty means the process default.
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
}

/// One conversation held in memory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Opaque unique identifier; immutable.
    pub id: String,
    /// Backend model variant; immutable.
    pub model: String,
    /// Static system instruction; immutable.
    pub system_instruction: Option<String>,
    /// Session-specific tool catalogue; empty means the process default.
    pub tools: Vec<ToolDefinition>,
    /// Full transcript, sent verbatim to the backend on every turn.
    pub history: Vec<Content>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Construct a session with a generated identifier and empty history.
    #[must_use]
    pub fn new(model: String, system_instruction: Option<String>, tools: Vec<ToolDefinition>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            model,
            system_instruction,
            tools,
            history: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// The catalogue sent to the backend: the session's own if non-empty,
    /// otherwise `default`. The two are never merged.
    #[must_use]
    pub fn effective_tools<'a>(&'a self, default: &'a [ToolDefinition]) -> &'a [ToolDefinition] {
        if self.tools.is_empty() {
            default
        } else {
            &self.tools
        }
    }
}
