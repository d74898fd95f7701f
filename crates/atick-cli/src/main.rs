mod cli;
mod commands;
mod format;
mod util;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::{cmd_config, cmd_decode, cmd_gatt, cmd_poll};
use crate::format::FormatOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
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
        .with_writer(std::io::stderr)
        .init();

    let opts = FormatOptions::new(cli.no_color, cli.compact);
    let output = cli.output.as_ref();

    match cli.command {
        Commands::Decode { mac, pin, payload } => {
            cmd_decode(&mac, &pin, &payload, cli.format, output, &opts)?;
        }
        Commands::Gatt { payload, ratio } => {
            cmd_gatt(&payload, ratio, cli.format, output, &opts)?;
        }
        Commands::Config { path } => {
            cmd_config(&path, cli.format, output, &opts)?;
        }
        Commands::Poll {
            config,
            scan_timeout,
        } => {
            cmd_poll(
                &config,
                Duration::from_secs(scan_timeout),
                cli.format,
                output,
                &opts,
            )
            .await?;
        }
    }

    Ok(())
}
