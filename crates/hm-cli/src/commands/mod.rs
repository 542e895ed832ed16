//! CLI subcommand implementations.

pub mod config;
pub mod probe;
pub mod replay;
