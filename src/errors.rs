//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// ACP framing or JSON parsing failure on the transport.
    Acp(String),
    /// Request parameters did not match the method's expected shape.
    InvalidParams(String),
    /// Request named a method the server does not implement.
    MethodNotFound(String),
    /// Method called before the `initialize` handshake completed.
    NotInitialized,
    /// No authenticated backend is available.
    AuthRequired,
    /// Requested session does not exist.
    NotFound(String),
    /// Session already has a turn in flight.
    SessionBusy(String),
    /// The in-flight backend call was cancelled.
    Cancelled,
    /// Model backend request or stream failure.
    Backend(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Acp(msg) => write!(f, "acp: {msg}"),
            Self::InvalidParams(msg) => write!(f, "invalid params: {msg}"),
            Self::MethodNotFound(method) => write!(f, "method not found: {method}"),
            Self::NotInitialized => write!(f, "not initialized"),
            Self::AuthRequired => write!(f, "authentication required"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::SessionBusy(msg) => write!(f, "session busy: {msg}"),
            Self::Cancelled => write!(f, "request cancelled"),
            Self::Backend(msg) => write!(f, "backend: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Acp(format!("malformed json: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
