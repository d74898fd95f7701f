//! Core types for aTick water meter data.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// PIN used by factory-fresh devices.
pub const DEFAULT_PIN: &str = "123456";

/// Ratio applied to raw counter values when nothing else is configured.
pub const DEFAULT_COUNTER_RATIO: f64 = 0.01;

/// Decimal places kept for displayed values.
pub const DISPLAY_PRECISION: i32 = 3;

/// Identifies one of the two counters of an aTick device.
///
/// A closed enum: string keys used by older integrations are parsed into it
/// with [`FromStr`], [`CounterId::from_value_key`] or
/// [`CounterId::from_entity_id`] and never used past that boundary.
///
/// # Examples
///
/// ```
/// use atick_types::CounterId;
///
/// assert_eq!(CounterId::A.value_key(), "counter_a_value");
/// assert_eq!(CounterId::B.ratio_key(), "counter_b_ratio");
/// assert_eq!("counter_b_value".parse::<CounterId>(), Ok(CounterId::B));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CounterId {
    /// First counter (usually cold water).
    A,
    /// Second counter (usually hot water).
    B,
}

impl CounterId {
    /// Both counters, in order.
    pub const ALL: [CounterId; 2] = [CounterId::A, CounterId::B];

    /// Base key shared by all fields of this counter.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            CounterId::A => "counter_a",
            CounterId::B => "counter_b",
        }
    }

    /// Key of the raw value field.
    #[must_use]
    pub fn value_key(&self) -> &'static str {
        match self {
            CounterId::A => "counter_a_value",
            CounterId::B => "counter_b_value",
        }
    }

    /// Key of the ratio field.
    #[must_use]
    pub fn ratio_key(&self) -> &'static str {
        match self {
            CounterId::A => "counter_a_ratio",
            CounterId::B => "counter_b_ratio",
        }
    }

    /// Key of the offset field.
    #[must_use]
    pub fn offset_key(&self) -> &'static str {
        match self {
            CounterId::A => "counter_a_offset",
            CounterId::B => "counter_b_offset",
        }
    }

    /// Resolve a value key such as `counter_a_value`.
    pub fn from_value_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.value_key() == key)
    }

    /// Determine the counter an entity ID refers to.
    ///
    /// ```
    /// use atick_types::CounterId;
    ///
    /// assert_eq!(CounterId::from_entity_id("sensor.atick_123_counter_a"), Some(CounterId::A));
    /// assert_eq!(CounterId::from_entity_id("sensor.atick_123_rssi"), None);
    /// ```
    pub fn from_entity_id(entity_id: &str) -> Option<Self> {
        if entity_id.contains("counter_a") {
            Some(CounterId::A)
        } else if entity_id.contains("counter_b") {
            Some(CounterId::B)
        } else {
            None
        }
    }
}

impl FromStr for CounterId {
    type Err = ParseError;

    /// Accepts `a`/`b` (any case), the base key, or any of the derived keys.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|id| {
                let short = match id {
                    CounterId::A => "a",
                    CounterId::B => "b",
                };
                lower == short
                    || lower == id.key()
                    || lower == id.value_key()
                    || lower == id.ratio_key()
                    || lower == id.offset_key()
            })
            .ok_or_else(|| ParseError::UnknownCounter(s.to_string()))
    }
}

impl fmt::Display for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterId::A => write!(f, "Counter A"),
            CounterId::B => write!(f, "Counter B"),
        }
    }
}

/// Round to `places` decimals, halves away from zero.
///
/// ```
/// use atick_types::round_half_away;
///
/// assert_eq!(round_half_away(2.5, 0), 3.0);
/// assert_eq!(round_half_away(-2.5, 0), -3.0);
/// ```
#[must_use]
pub fn round_half_away(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Raw value and calibration of a single counter.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CounterState {
    /// Reading in device units, `None` until first received.
    pub raw: Option<f64>,
    /// Multiplier from raw to displayed units.
    pub ratio: f64,
    /// Added after the ratio, in displayed units.
    pub offset: f64,
}

impl Default for CounterState {
    fn default() -> Self {
        Self {
            raw: None,
            ratio: DEFAULT_COUNTER_RATIO,
            offset: 0.0,
        }
    }
}

impl CounterState {
    /// Displayed value (`raw * ratio + offset`, 3 decimals), if a raw value is known.
    #[must_use]
    pub fn display_value(&self) -> Option<f64> {
        self.raw
            .map(|raw| round_half_away(raw * self.ratio + self.offset, DISPLAY_PRECISION))
    }

    /// Raw value that displays as `displayed` under the current calibration.
    ///
    /// A zero ratio falls back to subtracting the offset only.
    #[must_use]
    pub fn raw_from_display(&self, displayed: f64) -> f64 {
        if self.ratio != 0.0 {
            (displayed - self.offset) / self.ratio
        } else {
            displayed - self.offset
        }
    }
}

/// Everything the driver knows about one physical device.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceState {
    /// Model number string.
    pub model: Option<String>,
    /// Manufacturer name string.
    pub manufacturer: Option<String>,
    /// Firmware revision string.
    pub firmware_version: Option<String>,
    /// Counter A.
    pub counter_a: CounterState,
    /// Counter B.
    pub counter_b: CounterState,
}

impl DeviceState {
    /// Borrow a counter.
    pub fn counter(&self, id: CounterId) -> &CounterState {
        match id {
            CounterId::A => &self.counter_a,
            CounterId::B => &self.counter_b,
        }
    }

    /// Mutably borrow a counter.
    pub fn counter_mut(&mut self, id: CounterId) -> &mut CounterState {
        match id {
            CounterId::A => &mut self.counter_a,
            CounterId::B => &mut self.counter_b,
        }
    }

    /// Metadata read over GATT.
    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            model: self.model.clone(),
            manufacturer: self.manufacturer.clone(),
            firmware_version: self.firmware_version.clone(),
        }
    }
}

/// Device metadata read during an active session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceInfo {
    /// Model number.
    pub model: Option<String>,
    /// Manufacturer name.
    pub manufacturer: Option<String>,
    /// Firmware version.
    pub firmware_version: Option<String>,
}
