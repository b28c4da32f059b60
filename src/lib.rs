#![forbid(unsafe_code)]

//! Bridge between the Agent Client Protocol and a streaming Gemini backend.

pub mod acp;
pub mod backend;
pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
