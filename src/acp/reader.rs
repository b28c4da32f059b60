//! Inbound line parsing.
//!
//! Each line read from the transport is parsed on its own; a bad line yields
//! an error for that line only and never affects the lines after it.

use crate::acp::message::RpcRequest;
use crate::{AppError, Result};

/// Parse one NDJSON line into an [`RpcRequest`].
///
/// # Return value
///
/// - `Ok(Some(request))`: a well-formed request or notification.
/// - `Ok(None)`: the line is empty or whitespace and is skipped.
///
/// # Errors
///
/// - `AppError::Acp("malformed json: …")` if the line is not valid JSON.
/// - `AppError::Acp("malformed request: …")` if the JSON is not an object
///   with a string `method`.
pub fn parse_request_line(line: &str) -> Result<Option<RpcRequest>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| AppError::Acp(format!("malformed json: {e}")))?;

    let request: RpcRequest = serde_json::from_value(value)
        .map_err(|e| AppError::Acp(format!("malformed request: {e}")))?;

    Ok(Some(request))
}
