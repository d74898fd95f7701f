//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "atick")]
#[command(author, version, about = "CLI for aTick BLE water meters", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Output compact JSON (no pretty-printing)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Disable colored output
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub no_color: bool,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode a captured manufacturer data payload
    Decode {
        /// Device MAC address (XX:XX:XX:XX:XX:XX)
        #[arg(short, long, env = "ATICK_MAC")]
        mac: String,

        /// PIN used to de-obfuscate the payload
        #[arg(short, long, env = "ATICK_PIN", default_value = atick_types::DEFAULT_PIN)]
        pin: String,

        /// Payload as hex (whitespace between bytes allowed)
        payload: String,
    },

    /// Decode a counters value or ratio buffer read over GATT
    Gatt {
        /// Buffer as hex (whitespace between bytes allowed)
        payload: String,

        /// Treat the buffer as counter ratios
        #[arg(long)]
        ratio: bool,
    },

    /// Load, validate and print a driver configuration
    Config {
        /// Configuration file
        #[arg(short, long, default_value = "atick.toml")]
        path: PathBuf,
    },

    /// Run one active update against a device
    Poll {
        /// Configuration file
        #[arg(short, long, default_value = "atick.toml")]
        config: PathBuf,

        /// Scan timeout in seconds
        #[arg(short = 'T', long, default_value = "10")]
        scan_timeout: u64,
    },
}
