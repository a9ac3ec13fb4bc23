//! Command-line interface for BLE wearable telemetry.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scan` | Scan for nearby wearables |
//! | `discover` | List a device's services, characteristics and cached values |
//! | `watch` | Stream decoded samples from a device |
//! | `simulate` | Stream samples from the synthetic generator |
//! | `config` | Manage CLI configuration |
//! | `completions` | Generate shell completions |

mod cli;
mod commands;
mod config;
mod format;
mod style;
mod util;

use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::{
    SimulateArgs, WatchArgs, cmd_config, cmd_discover, cmd_scan, cmd_simulate, cmd_watch,
};
use crate::config::{Config, resolve_format};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "pulse", &mut io::stdout());
        return Ok(());
    }

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = Config::load();
    let format = resolve_format(cli.format, &config);
    let no_color = cli.no_color || config.no_color;
    let output = cli.output.as_ref();

    match cli.command {
        Commands::Scan { timeout, all } => {
            cmd_scan(timeout, all, format, output, cli.quiet, no_color, &config).await?;
        }
        Commands::Discover { device } => {
            cmd_discover(device, format, output, cli.quiet, no_color, &config).await?;
        }
        Commands::Watch { device, count } => {
            cmd_watch(
                WatchArgs {
                    device,
                    count,
                    format,
                    output: cli.output.clone(),
                    quiet: cli.quiet,
                    no_color,
                },
                &config,
            )
            .await?;
        }
        Commands::Simulate { seed, count, speed } => {
            cmd_simulate(SimulateArgs {
                seed,
                count,
                speed,
                format,
                output: cli.output.clone(),
                quiet: cli.quiet,
                no_color,
            })
            .await?;
        }
        Commands::Config { action } => cmd_config(action, &Config::path(), cli.quiet)?,
        Commands::Completions { .. } => unreachable!("handled before tracing init"),
    }

    Ok(())
}
