//! Bluetooth UUIDs for aTick devices.
//!
//! This module contains all the UUIDs needed to communicate with aTick
//! water meters over Bluetooth Low Energy.

use uuid::{Uuid, uuid};

// --- aTick Service UUID ---

/// Vendor service holding every characteristic the driver uses.
pub const ATICK_SERVICE: Uuid = uuid!("348634b0-efe4-11e4-b80c-0800200c9a66");

// --- Device Information Characteristic UUIDs ---

/// Model number string characteristic.
pub const MODEL_NUMBER: Uuid = uuid!("00002a24-0000-1000-8000-00805f9b34fb");

/// Firmware revision string characteristic.
pub const FIRMWARE_REVISION: Uuid = uuid!("00002a26-0000-1000-8000-00805f9b34fb");

/// Manufacturer name string characteristic.
pub const MANUFACTURER_NAME: Uuid = uuid!("00002a29-0000-1000-8000-00805f9b34fb");

// --- aTick Characteristic UUIDs ---

/// PIN characteristic.
pub const PIN: Uuid = uuid!("348634b2-efe4-11e4-b80c-0800200c9a66");

/// Device options characteristic.
pub const OPTIONS: Uuid = uuid!("348634b3-efe4-11e4-b80c-0800200c9a66");

/// Command characteristic.
pub const COMMAND: Uuid = uuid!("348634b5-efe4-11e4-b80c-0800200c9a66");

/// Counter configuration characteristic.
pub const COUNTERS: Uuid = uuid!("348634b6-efe4-11e4-b80c-0800200c9a66");

/// Operating mode characteristic.
pub const MODE: Uuid = uuid!("348634b7-efe4-11e4-b80c-0800200c9a66");

/// Counter values as two little-endian f32 (raw units).
pub const COUNTERS_VALUE: Uuid = uuid!("348634b8-efe4-11e4-b80c-0800200c9a66");

/// Counter ratios (multipliers) as two little-endian f32.
pub const COUNTERS_RATIO: Uuid = uuid!("348634b9-efe4-11e4-b80c-0800200c9a66");
