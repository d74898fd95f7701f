//! Gatt command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use atick_core::codec::{FLOAT_PAIR_LEN, decode_float_pair, decode_ratio_pair, parse_hex_payload};

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, GattReport, format_gatt_text};
use crate::util::write_output;

pub fn gatt_report(payload: &str, ratio: bool) -> Result<GattReport> {
    let data = parse_hex_payload(payload).context("Invalid payload")?;
    if data.len() < FLOAT_PAIR_LEN {
        bail!(
            "Buffer too short: expected {} bytes, got {}",
            FLOAT_PAIR_LEN,
            data.len()
        );
    }

    let (kind, decoded) = if ratio {
        ("Ratios", decode_ratio_pair(&data))
    } else {
        ("Counters", decode_float_pair(&data))
    };
    let Some((a, b)) = decoded else {
        bail!("Buffer holds non-finite values");
    };
    Ok(GattReport { kind, a, b })
}

pub fn cmd_gatt(
    payload: &str,
    ratio: bool,
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    let report = gatt_report(payload, ratio)?;

    let content = match format {
        OutputFormat::Json => opts.as_json(&report)?,
        OutputFormat::Text => format_gatt_text(&report, opts),
    };
    write_output(output, &content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_values_are_truncated() {
        // 123.456f32, 1.0f32
        let report = gatt_report("79e9f642 0000803f", false).unwrap();
        assert_eq!(report.kind, "Counters");
        assert_eq!(report.a, 123.45);
        assert_eq!(report.b, 1.0);
    }

    #[test]
    fn test_ratios_keep_small_values() {
        // 0.01f32 twice
        let report = gatt_report("0ad7233c0ad7233c", true).unwrap();
        assert_eq!(report.kind, "Ratios");
        assert_eq!(report.a, 0.01);
        assert_eq!(report.b, 0.01);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let err = gatt_report("0000803f", false).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_nan_is_rejected() {
        assert!(gatt_report("0000c07f0000803f", false).is_err());
    }
}
