//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};

/// Host application telemetry.
///
/// Replays recorded host sessions through the telemetry engine and inspects
/// the presence probe of the current machine.
#[derive(Debug, Parser)]
#[command(name = "hm", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Replay a JSON-lines host script and write the resulting records.
    Replay {
        /// Script with one timed step per line.
        script: PathBuf,

        /// Write records here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Wall-clock time of script second zero (RFC 3339, default now).
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// How records are written.
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Sample the presence probe of this machine.
    Probe {
        /// Number of samples.
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,

        /// Milliseconds between samples.
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },

    /// Print the effective configuration.
    Config,
}

/// Record output format for `replay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line.
    Json,
    /// Records as log events on the `hm::telemetry` target.
    Log,
}
