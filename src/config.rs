//! Global configuration parsing and validation.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::models::tool::{default_catalogue, ToolDefinition};
use crate::{AppError, Result};

/// Model backend connectivity settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackendConfig {
    /// Base URL of the generative language API, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout for establishing a streaming call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// How long a bearer token is reused before the credential source is
    /// consulted again.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_seconds: default_request_timeout(),
            token_ttl_seconds: default_token_ttl(),
        }
    }
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_token_ttl() -> u64 {
    3000
}

fn default_model() -> String {
    "gemini-2.5-pro".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Model used by sessions that do not request one.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// System instruction used by sessions that do not supply one.
    #[serde(default)]
    pub system_instruction: Option<String>,
    /// Backend connectivity settings.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Process-wide default tool catalogue.
    #[serde(default = "default_catalogue")]
    pub tools: Vec<ToolDefinition>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            system_instruction: None,
            backend: BackendConfig::default(),
            tools: default_catalogue(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Timeout applied while establishing a streaming call.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_seconds)
    }

    /// Lifetime of a cached bearer token.
    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.backend.token_ttl_seconds)
    }

    /// Re-run validation after fields were overridden programmatically.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first invalid field.
    pub fn validate(&mut self) -> Result<()> {
        self.default_model = self.default_model.trim().to_owned();
        if self.default_model.is_empty() {
            return Err(AppError::Config("default_model must not be empty".into()));
        }

        let base_url = self.backend.base_url.trim_end_matches('/').to_owned();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(AppError::Config(format!(
                "backend.base_url must be an http(s) URL, got '{base_url}'"
            )));
        }
        self.backend.base_url = base_url;

        if self.backend.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "backend.request_timeout_seconds must be greater than zero".into(),
            ));
        }

        let mut seen = HashSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(AppError::Config("tool name must not be empty".into()));
            }
            if !seen.insert(tool.name.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate tool name '{}'",
                    tool.name
                )));
            }
        }

        Ok(())
    }
}
