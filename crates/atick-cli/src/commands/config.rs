//! Config command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use atick_core::DriverConfig;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_config_text};
use crate::util::write_output;

pub fn cmd_config(
    path: &Path,
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    let config = DriverConfig::load_validated(path)
        .with_context(|| format!("Invalid configuration {}", path.display()))?;
    tracing::debug!("Loaded configuration for {}", config.address);

    let content = match format {
        OutputFormat::Json => opts.as_json(&config)?,
        OutputFormat::Text => format_config_text(&config, opts),
    };
    write_output(output, &content)
}
