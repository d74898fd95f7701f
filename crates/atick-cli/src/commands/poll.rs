//! Poll command implementation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use atick_core::{BtleTransport, DeviceDriver, DriverConfig};
use tokio_util::sync::CancellationToken;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_snapshot_text};
use crate::util::write_output;

pub async fn cmd_poll(
    config_path: &Path,
    scan_timeout: Duration,
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    let mut config = DriverConfig::load_validated(config_path)
        .with_context(|| format!("Invalid configuration {}", config_path.display()))?;
    let address = config.address.clone();

    let transport = BtleTransport::find(&address, scan_timeout, config.connection_config())
        .await
        .with_context(|| format!("Failed to find device {}", address))?;
    let manufacturer_data = transport.manufacturer_data().await.unwrap_or_default();
    if config.name.is_none() {
        config.name = transport.local_name().await.ok().flatten();
    }

    let driver = DeviceDriver::new(config, transport)?;
    if driver.on_manufacturer_data(&manufacturer_data) {
        tracing::info!("Applied counters from last advertisement");
    }

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = driver.active_update(&cancel).await;
    ctrl_c.abort();
    driver.cleanup().await;
    result.with_context(|| format!("Active update of {} failed", address))?;

    let snapshot = driver.snapshot();
    let content = match format {
        OutputFormat::Json => opts.as_json(&snapshot)?,
        OutputFormat::Text => format_snapshot_text(&snapshot, opts),
    };
    write_output(output, &content)
}
