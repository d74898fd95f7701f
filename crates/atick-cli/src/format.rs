//! Output formatting utilities for text and JSON output.

use anyhow::Result;
use atick_core::{DeviceSnapshot, DriverConfig};
use atick_types::CounterId;
use owo_colors::OwoColorize;
use serde::Serialize;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool, compact: bool) -> Self {
        Self { no_color, compact }
    }

    /// Serialize to JSON, respecting the compact flag.
    pub fn as_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        Ok(json + "\n")
    }

    fn label(&self, text: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            format!("{}", text.bold())
        }
    }

    fn value(&self, value: Option<f64>) -> String {
        match value {
            Some(v) if self.no_color => v.to_string(),
            Some(v) => format!("{}", v.to_string().cyan()),
            None if self.no_color => "-".to_string(),
            None => format!("{}", "-".dimmed()),
        }
    }
}

/// Result of decoding one advertisement payload.
#[derive(Debug, Clone, Serialize)]
pub struct DecodeReport {
    pub mac: String,
    pub encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<u8>,
    pub counter_a: f64,
    pub counter_b: f64,
}

/// Result of decoding a GATT float-pair buffer.
#[derive(Debug, Clone, Serialize)]
pub struct GattReport {
    pub kind: &'static str,
    pub a: f64,
    pub b: f64,
}

pub fn format_decode_text(report: &DecodeReport, opts: &FormatOptions) -> String {
    let mut output = String::new();
    output.push_str(&format!("{}  {}\n", opts.label("Device:   "), report.mac));
    let encrypted = match report.key {
        Some(key) => format!("yes (key 0x{key:02X})"),
        None => "no".to_string(),
    };
    output.push_str(&format!("{}  {}\n", opts.label("Encrypted:"), encrypted));
    output.push_str(&format!(
        "{}  {}\n",
        opts.label("Counter A:"),
        opts.value(Some(report.counter_a))
    ));
    output.push_str(&format!(
        "{}  {}\n",
        opts.label("Counter B:"),
        opts.value(Some(report.counter_b))
    ));
    output
}

pub fn format_gatt_text(report: &GattReport, opts: &FormatOptions) -> String {
    format!(
        "{} A={} B={}\n",
        opts.label(&format!("{}:", report.kind)),
        opts.value(Some(report.a)),
        opts.value(Some(report.b))
    )
}

pub fn format_config_text(config: &DriverConfig, opts: &FormatOptions) -> String {
    let mut output = String::new();
    let name = config.name.as_deref().unwrap_or("-");
    output.push_str(&format!("{}  {}\n", opts.label("Address:      "), config.address));
    output.push_str(&format!("{}  {}\n", opts.label("Name:         "), name));
    output.push_str(&format!(
        "{}  {}s\n",
        opts.label("Poll interval:"),
        config.poll_interval
    ));
    output.push_str(&format!(
        "{}  {:?}\n",
        opts.label("Ratio source: "),
        config.ratio_source
    ));
    for id in CounterId::ALL {
        output.push_str(&format!(
            "{}  ratio {} offset {}\n",
            opts.label(&format!("Counter {id}:    ")),
            config.ratio(id),
            config.offset(id)
        ));
    }
    output.push_str(&format!(
        "{}  connect {}s, lock {}s, operation {}s\n",
        opts.label("Timeouts:     "),
        config.connection.connect_timeout,
        config.connection.lock_timeout,
        config.connection.operation_timeout
    ));
    output.push_str(&format!(
        "{}  {} failures, base {}s\n",
        opts.label("Backoff:      "),
        config.backoff.max_failures,
        config.backoff.base_delay
    ));
    output
}

pub fn format_snapshot_text(snapshot: &DeviceSnapshot, opts: &FormatOptions) -> String {
    let state = &snapshot.state;
    let mut output = String::new();
    for (label, value) in [
        ("Model:       ", &state.model),
        ("Manufacturer:", &state.manufacturer),
        ("Firmware:    ", &state.firmware_version),
    ] {
        output.push_str(&format!(
            "{}  {}\n",
            opts.label(label),
            value.as_deref().unwrap_or("-")
        ));
    }
    for id in CounterId::ALL {
        let counter = state.counter(id);
        output.push_str(&format!(
            "{}  {} m³ (raw {}, ratio {}, offset {})\n",
            opts.label(&format!("Counter {id}:   ")),
            opts.value(snapshot.display_value(id)),
            counter.raw.map_or_else(|| "-".to_string(), |r| r.to_string()),
            counter.ratio,
            counter.offset
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use atick_types::DeviceState;

    fn plain() -> FormatOptions {
        FormatOptions::new(true, false)
    }

    #[test]
    fn test_decode_text_shows_key_when_encrypted() {
        let report = DecodeReport {
            mac: "AA:BB:CC:DD:EE:FF".to_string(),
            encrypted: true,
            key: Some(0xE2),
            counter_a: 123.25,
            counter_b: 0.15,
        };
        let text = format_decode_text(&report, &plain());
        assert!(text.contains("yes (key 0xE2)"));
        assert!(text.contains("123.25"));
        assert!(text.contains("0.15"));
    }

    #[test]
    fn test_decode_json_omits_key_when_plain() {
        let report = DecodeReport {
            mac: "AA:BB:CC:DD:EE:FF".to_string(),
            encrypted: false,
            key: None,
            counter_a: 123.25,
            counter_b: 2.0,
        };
        let json = FormatOptions::new(true, true).as_json(&report).unwrap();
        assert!(!json.contains("key"));
        assert!(json.contains("\"encrypted\":false"));
        assert!(json.ends_with('\n'));
    }

    #[test]
    fn test_snapshot_text_marks_missing_values() {
        let mut state = DeviceState::default();
        state.model = Some("aTick".to_string());
        state.counter_a.raw = Some(12345.0);
        let snapshot = DeviceSnapshot {
            counter_a_display: state.counter_a.display_value(),
            counter_b_display: None,
            state,
        };

        let text = format_snapshot_text(&snapshot, &plain());
        assert!(text.contains("aTick"));
        assert!(text.contains("123.45 m³"));
        assert!(text.contains("Firmware:      -"));
    }

    #[test]
    fn test_colored_output_differs_from_plain() {
        let report = GattReport {
            kind: "Ratios",
            a: 0.01,
            b: 0.001,
        };
        let colored = format_gatt_text(&report, &FormatOptions::new(false, false));
        let plain = format_gatt_text(&report, &plain());
        assert_eq!(plain, "Ratios: A=0.01 B=0.001\n");
        assert_ne!(colored, plain);
    }
}
