//! CLI commands

pub mod records;
pub mod stream;
