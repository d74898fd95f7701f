//! Decode command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use atick_core::codec::{
    is_encrypted, keystream_byte, parse_hex_payload, parse_mac, parse_pin,
    try_decode_advertisement,
};

use crate::cli::OutputFormat;
use crate::format::{DecodeReport, FormatOptions, format_decode_text};
use crate::util::write_output;

pub fn decode_report(mac: &str, pin: &str, payload: &str) -> Result<DecodeReport> {
    let octets = parse_mac(mac)?;
    let data = parse_hex_payload(payload).context("Invalid payload")?;
    let encrypted = is_encrypted(&data);
    let key = if encrypted {
        Some(keystream_byte(&octets, parse_pin(pin)?))
    } else {
        None
    };

    let (counter_a, counter_b) =
        try_decode_advertisement(&data, pin, mac).context("Failed to decode payload")?;

    Ok(DecodeReport {
        mac: mac.to_string(),
        encrypted,
        key,
        counter_a,
        counter_b,
    })
}

pub fn cmd_decode(
    mac: &str,
    pin: &str,
    payload: &str,
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    let report = decode_report(mac, pin, payload)?;
    tracing::debug!("Decoded {:?}", report);

    let content = match format {
        OutputFormat::Json => opts.as_json(&report)?,
        OutputFormat::Text => format_decode_text(&report, opts),
    };
    write_output(output, &content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: &str = "AA:BB:CC:DD:EE:FF";

    #[test]
    fn test_decode_encrypted_payload() {
        let report = decode_report(MAC, "123456", "00 14 a0 e2 62 fb dc 78 7b").unwrap();
        assert!(report.encrypted);
        assert_eq!(report.key, Some(0xE2));
        assert_eq!(report.counter_a, 123.25);
        assert_eq!(report.counter_b, 0.15);
    }

    #[test]
    fn test_decode_plain_payload_ignores_pin() {
        let report = decode_report(MAC, "not-a-pin", "000080f642000000 40").unwrap();
        assert!(!report.encrypted);
        assert_eq!(report.key, None);
        assert_eq!(report.counter_a, 123.25);
        assert_eq!(report.counter_b, 2.0);
    }

    #[test]
    fn test_decode_rejects_short_payload() {
        let err = decode_report(MAC, "123456", "0001").unwrap_err();
        assert!(err.to_string().contains("Failed to decode payload"));
    }

    #[test]
    fn test_decode_rejects_bad_mac() {
        assert!(decode_report("AA:BB", "123456", "00").is_err());
    }
}
