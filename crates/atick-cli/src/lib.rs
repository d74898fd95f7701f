//! Command-line interface for aTick BLE water meters.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `decode` | Decode a captured manufacturer data payload |
//! | `gatt` | Decode a counters value or ratio buffer |
//! | `config` | Load, validate and print a driver configuration |
//! | `poll` | Run one active update against a device |
//!
//! # Output Formats
//!
//! - **Text** (default): Human-readable colored output
//! - **JSON**: Machine-readable JSON format
//!
//! # Environment Variables
//!
//! - `ATICK_MAC`: Default MAC address for `decode`
//! - `ATICK_PIN`: Default PIN for `decode`
//! - `NO_COLOR`: Disable colored output when set
//! - `RUST_LOG`: Log filter when neither `--verbose` nor `--quiet` is given
//!
//! # Examples
//!
//! Decode an obfuscated advertisement:
//! ```bash
//! atick decode --mac AA:BB:CC:DD:EE:FF "00 14 a0 e2 62 fb dc 78 7b"
//! ```
//!
//! Poll a configured device:
//! ```bash
//! atick poll --config atick.toml --format json
//! ```

// Re-export core dependencies for convenience
pub use atick_core;
pub use atick_types;
