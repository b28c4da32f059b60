//! Agent Client Protocol (ACP) front-end.
//!
//! The client talks to this process over stdin/stdout with one JSON-RPC
//! message per line in each direction.
//!
//! - `codec`: NDJSON framing with a line-length cap.
//! - `message`: request/response envelopes and error codes.
//! - `reader`: turns one inbound line into a request.
//! - `writer`: serialises outbound responses and notifications.
//! - `server`: method dispatch and the request loop.

pub mod codec;
pub mod message;
pub mod reader;
pub mod server;
pub mod writer;
