//! ACP writer task.
//!
//! Receives outbound JSON messages from a tokio [`mpsc`] channel and writes
//! each one as a single NDJSON line. Responses and `sessionUpdate`
//! notifications share the channel, so the client sees them in the order
//! they were produced.

use futures_util::SinkExt;
use serde_json::Value;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tracing::{debug, warn};

use crate::acp::codec::AcpCodec;
use crate::Result;

/// Write outbound messages from `msg_rx` to `output`, one line each.
///
/// Every message is flushed before the next one is taken from the channel.
/// The task returns once every sender has been dropped and the channel is
/// drained.
///
/// # Errors
///
/// - `AppError::Acp("failed to serialise outbound message: …")` if a value
///   cannot be encoded.
/// - `AppError::Io` if the transport write fails.
pub async fn run_writer<W>(output: W, mut msg_rx: mpsc::Receiver<Value>) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut framed = FramedWrite::new(output, AcpCodec::new());
    let mut written = 0u64;

    while let Some(value) = msg_rx.recv().await {
        framed.send(value).await.inspect_err(|e| {
            warn!(error = %e, written, "acp writer: write failed");
        })?;
        written += 1;
    }

    debug!(written, "acp writer: channel closed, stopping");
    Ok(())
}
