use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hm_cli::commands::{config, probe, replay};
use hm_cli::{Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match &cli.command {
        Some(Commands::Replay {
            script,
            output,
            start,
            format,
        }) => {
            let config = Config::load_or_disabled(cli.config.as_deref());
            tracing::debug!(?config, "loaded configuration");
            replay::run(script, output.as_deref(), *start, *format, &config)?;
        }
        Some(Commands::Probe { count, interval_ms }) => {
            let probe = hm_probe::platform_probe();
            probe::run(
                &mut std::io::stdout().lock(),
                &probe,
                *count,
                Duration::from_millis(*interval_ms),
            )?;
        }
        Some(Commands::Config) => {
            let config = Config::load_or_disabled(cli.config.as_deref());
            config::run(&mut std::io::stdout().lock(), &config)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
