//! Session orchestration.
//!
//! - [`session_store`]: in-memory conversation state and cancellation slots.
//! - [`translator`]: per-turn conversion of backend events into
//!   `sessionUpdate` payloads.
//! - [`turn`]: drives one prompt or tool-result turn against the backend.

pub mod session_store;
pub mod translator;
pub mod turn;
