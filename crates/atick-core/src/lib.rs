//! Core BLE driver for aTick water meters.
//!
//! An aTick meter exposes two pulse counters. It broadcasts their values in
//! BLE manufacturer data (optionally obfuscated with a MAC/PIN-derived
//! keystream) and serves metadata, ratios and counter values over GATT.
//!
//! # Features
//!
//! - **Passive decoding**: decode advertisements without connecting
//! - **Active sessions**: bounded, serialized connections with backoff
//! - **Counter calibration**: ratio and offset per counter
//! - **Pluggable transport**: btleplug for hardware, a mock for tests
//!
//! # Platform Differences
//!
//! The keystream is derived from the device MAC address. On macOS, btleplug
//! identifies peripherals by a CoreBluetooth UUID instead, so the MAC must be
//! configured explicitly.
//!
//! # Quick Start
//!
//! ```
//! use atick_core::{CounterId, DeviceDriver, DriverConfig, MockTransport};
//!
//! let config = DriverConfig::new("AA:BB:CC:DD:EE:FF");
//! let driver = DeviceDriver::new(config, MockTransport::new()).unwrap();
//!
//! let payload = [0x00, 0x00, 0x80, 0xF6, 0x42, 0x00, 0x00, 0x00, 0x40];
//! assert!(driver.on_advertisement(None, &[(0x0A0B, payload.to_vec())]));
//! assert_eq!(driver.raw_value(CounterId::A), Some(123.25));
//! ```

pub mod backoff;
pub mod btle;
pub mod codec;
pub mod config;
pub mod connection;
pub mod counters;
pub mod driver;
pub mod error;
pub mod guard;
pub mod mock;
pub mod transport;

pub use atick_types::types;
pub use atick_types::uuid;

// Core exports
pub use driver::DeviceDriver;
pub use error::{Error, Result};

pub use backoff::{BackoffConfig, BackoffState};
pub use btle::{BtleLink, BtleTransport};
pub use codec::{ParsedAdvertisement, decode_advertisement, try_decode_advertisement};
pub use config::{ConfigError, DriverConfig, RatioSource, ValidationError};
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
pub use counters::{CounterModel, DeviceSnapshot};
pub use guard::SessionGuard;
pub use mock::{MockLink, MockStats, MockTransport};
pub use transport::{Clock, GattLink, ManualClock, TokioClock, Transport};

// Re-export from atick-types
pub use atick_types::{
    CounterId, CounterState, DEFAULT_COUNTER_RATIO, DEFAULT_PIN, DeviceInfo, DeviceState,
    ParseError,
};
