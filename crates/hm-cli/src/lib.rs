//! Host telemetry CLI library.
//!
//! This crate provides the `hm` command-line interface and the scripted host
//! used to replay recorded sessions through the engine.

mod cli;
pub mod commands;
mod config;
pub mod simulate;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::{Config, TelemetryConfig};
