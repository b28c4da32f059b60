//! Line framing for the ACP transport.
//!
//! Inbound bytes are split on `\n` by [`LinesCodec`] with a 1 MiB cap. A line
//! over the cap comes out as [`Frame::Oversized`] instead of a decode error:
//! `FramedRead` keeps polling, the codec drops the remainder of that line,
//! and the next line decodes normally.
//!
//! Outbound, each [`Value`] is serialised compactly and terminated with
//! `\n`. JSON escapes control characters inside strings, so one message is
//! always exactly one line.

use bytes::{BufMut, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Longest inbound line accepted, in bytes.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// One inbound unit produced by [`AcpCodec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, without its terminator.
    Line(String),
    /// A line longer than [`MAX_LINE_BYTES`]; its content is discarded.
    Oversized,
}

impl Frame {
    /// Detail reported to the client for an oversized line.
    #[must_use]
    pub fn oversized_detail() -> String {
        format!("line too long: exceeded {MAX_LINE_BYTES} bytes")
    }
}

/// NDJSON codec: [`Frame`]s in, JSON values out.
#[derive(Debug)]
pub struct AcpCodec {
    lines: LinesCodec,
}

impl AcpCodec {
    /// Codec enforcing [`MAX_LINE_BYTES`] on inbound lines.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_BYTES),
        }
    }
}

impl Default for AcpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AcpCodec {
    type Item = Frame;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        into_frame(self.lines.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        into_frame(self.lines.decode_eof(src))
    }
}

impl Encoder<Value> for AcpCodec {
    type Error = AppError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<()> {
        serde_json::to_writer((&mut *dst).writer(), &item)
            .map_err(|e| AppError::Acp(format!("failed to serialise outbound message: {e}")))?;
        dst.put_u8(b'\n');
        Ok(())
    }
}

fn into_frame(decoded: std::result::Result<Option<String>, LinesCodecError>) -> Result<Option<Frame>> {
    match decoded {
        Ok(line) => Ok(line.map(Frame::Line)),
        Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Frame::Oversized)),
        Err(LinesCodecError::Io(err)) => Err(AppError::Io(err.to_string())),
    }
}
