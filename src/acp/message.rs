//! JSON-RPC envelopes used on the ACP transport.
//!
//! | code     | meaning                                                   |
//! |----------|-----------------------------------------------------------|
//! | `-32700` | malformed request line                                    |
//! | `-32601` | unknown method                                            |
//! | `-32602` | parameters do not match the method                        |
//! | `-32002` | method called before `initialize`                         |
//! | `-32001` | auth required, session not found, or request cancelled    |
//! | `-32000` | any other failure; the message carries the detail         |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::update::SessionUpdate;
use crate::{AppError, Result};

/// Protocol version string carried in every envelope.
pub const JSONRPC_VERSION: &str = "2.0";
/// Method name of server-initiated update notifications.
pub const SESSION_UPDATE_METHOD: &str = "sessionUpdate";

/// Malformed request line.
pub const PARSE_ERROR: i64 = -32700;
/// Unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Parameters do not match the method.
pub const INVALID_PARAMS: i64 = -32602;
/// Method called before `initialize`.
pub const NOT_INITIALIZED: i64 = -32002;
/// Auth required, session not found, or request cancelled.
pub const SESSION_ERROR: i64 = -32001;
/// Unclassified internal failure.
pub const INTERNAL_ERROR: i64 = -32000;

/// Inbound request or notification.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RpcRequest {
    /// Protocol version; accepted but not enforced.
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Correlation id; absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Error for a line that could not be parsed as a request.
    #[must_use]
    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self {
            code: PARSE_ERROR,
            message: "parse error".into(),
            data: Some(Value::String(detail.into())),
        }
    }
}

impl From<&AppError> for RpcError {
    fn from(err: &AppError) -> Self {
        let code = match err {
            AppError::MethodNotFound(_) => METHOD_NOT_FOUND,
            AppError::InvalidParams(_) => INVALID_PARAMS,
            AppError::NotInitialized => NOT_INITIALIZED,
            AppError::AuthRequired | AppError::NotFound(_) | AppError::Cancelled => SESSION_ERROR,
            _ => INTERNAL_ERROR,
        };
        Self {
            code,
            message: err.to_string(),
            data: None,
        }
    }
}

/// Outbound response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: String,
    /// Id of the request being answered; `null` when it could not be read.
    pub id: Value,
    /// Successful result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Successful response carrying `result`.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Error response.
    #[must_use]
    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionUpdateParams<'a> {
    session_id: &'a str,
    update: &'a SessionUpdate,
}

#[derive(Serialize)]
struct Notification<P> {
    jsonrpc: &'static str,
    method: &'static str,
    params: P,
}

/// Build a `sessionUpdate` notification for `session_id`.
///
/// # Errors
///
/// Returns `AppError::Acp` if the update cannot be serialised.
pub fn session_update_notification(session_id: &str, update: &SessionUpdate) -> Result<Value> {
    Ok(serde_json::to_value(Notification {
        jsonrpc: JSONRPC_VERSION,
        method: SESSION_UPDATE_METHOD,
        params: SessionUpdateParams { session_id, update },
    })?)
}
