//! Domain model module declarations.

pub mod content;
pub mod session;
pub mod tool;
pub mod update;
