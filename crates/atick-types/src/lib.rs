//! Platform-agnostic types for aTick BLE water meters.
//!
//! This crate provides the shared data model used by `atick-core` and by
//! collaborators (presentation or persistence layers) that only need to read
//! device state.
//!
//! # Features
//!
//! - Counter identity and calibration types
//! - Device state and metadata structures
//! - UUID constants for BLE characteristics
//! - Error types for identifier parsing
//!
//! # Example
//!
//! ```
//! use atick_types::{CounterId, DeviceState};
//!
//! let mut state = DeviceState::default();
//! state.counter_mut(CounterId::A).raw = Some(100.0);
//! assert_eq!(state.counter(CounterId::A).display_value(), Some(1.0));
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{
    CounterId, CounterState, DEFAULT_COUNTER_RATIO, DEFAULT_PIN, DISPLAY_PRECISION, DeviceInfo,
    DeviceState, round_half_away,
};
pub use uuid as uuids;

#[cfg(test)]
mod tests {
    use super::*;

    // --- CounterId tests ---

    #[test]
    fn test_counter_keys() {
        assert_eq!(CounterId::A.value_key(), "counter_a_value");
        assert_eq!(CounterId::A.ratio_key(), "counter_a_ratio");
        assert_eq!(CounterId::A.offset_key(), "counter_a_offset");

        assert_eq!(CounterId::B.value_key(), "counter_b_value");
        assert_eq!(CounterId::B.ratio_key(), "counter_b_ratio");
        assert_eq!(CounterId::B.offset_key(), "counter_b_offset");
    }

    #[test]
    fn test_counter_from_str_accepts_legacy_keys() {
        assert_eq!("A".parse::<CounterId>(), Ok(CounterId::A));
        assert_eq!("b".parse::<CounterId>(), Ok(CounterId::B));
        assert_eq!("counter_a".parse::<CounterId>(), Ok(CounterId::A));
        assert_eq!("counter_a_value".parse::<CounterId>(), Ok(CounterId::A));
        assert_eq!("counter_b_offset".parse::<CounterId>(), Ok(CounterId::B));
    }

    #[test]
    fn test_counter_from_str_rejects_unknown() {
        let err = "counter_c_value".parse::<CounterId>().unwrap_err();
        assert_eq!(err, ParseError::UnknownCounter("counter_c_value".to_string()));
        assert!(err.to_string().contains("counter_c_value"));
    }

    #[test]
    fn test_counter_from_value_key() {
        assert_eq!(CounterId::from_value_key("counter_b_value"), Some(CounterId::B));
        assert_eq!(CounterId::from_value_key("counter_b_ratio"), None);
    }

    #[test]
    fn test_counter_from_entity_id() {
        assert_eq!(
            CounterId::from_entity_id("sensor.atick_123_counter_a"),
            Some(CounterId::A)
        );
        assert_eq!(
            CounterId::from_entity_id("sensor.atick_123_counter_b"),
            Some(CounterId::B)
        );
        assert_eq!(CounterId::from_entity_id("sensor.atick_123_rssi"), None);
    }

    // --- Conversion tests ---

    #[test]
    fn test_display_value_with_ratio() {
        let counter = CounterState {
            raw: Some(100.0),
            ratio: 0.01,
            offset: 0.0,
        };
        assert_eq!(counter.display_value(), Some(1.0));
    }

    #[test]
    fn test_display_value_with_ratio_and_offset() {
        let counter = CounterState {
            raw: Some(100.0),
            ratio: 0.01,
            offset: 10.0,
        };
        assert_eq!(counter.display_value(), Some(11.0));
    }

    #[test]
    fn test_display_value_absent_without_raw() {
        for (ratio, offset) in [(0.01, 0.0), (1.0, 5.0), (0.0, -3.0)] {
            let counter = CounterState {
                raw: None,
                ratio,
                offset,
            };
            assert_eq!(counter.display_value(), None);
        }
    }

    #[test]
    fn test_display_value_rounds_to_three_places() {
        let counter = CounterState {
            raw: Some(12345.678),
            ratio: 0.001,
            offset: 0.0,
        };
        assert_eq!(counter.display_value(), Some(12.346));
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        assert_eq!(round_half_away(2.5, 0), 3.0);
        assert_eq!(round_half_away(-2.5, 0), -3.0);
        assert_eq!(round_half_away(0.5, 0), 1.0);
        assert_eq!(round_half_away(1.5, 0), 2.0);
    }

    #[test]
    fn test_raw_from_display() {
        let counter = CounterState {
            raw: None,
            ratio: 0.01,
            offset: 0.0,
        };
        assert_eq!(counter.raw_from_display(1.5), 150.0);

        let counter = CounterState {
            raw: None,
            ratio: 0.01,
            offset: 10.0,
        };
        assert_eq!(counter.raw_from_display(15.0), 500.0);
    }

    #[test]
    fn test_raw_from_display_zero_ratio() {
        let counter = CounterState {
            raw: None,
            ratio: 0.0,
            offset: 2.0,
        };
        assert_eq!(counter.raw_from_display(5.0), 3.0);
    }

    // --- DeviceState tests ---

    #[test]
    fn test_device_state_default() {
        let state = DeviceState::default();
        assert!(state.model.is_none());
        assert!(state.manufacturer.is_none());
        assert!(state.firmware_version.is_none());
        for id in CounterId::ALL {
            let counter = state.counter(id);
            assert!(counter.raw.is_none());
            assert_eq!(counter.ratio, DEFAULT_COUNTER_RATIO);
            assert_eq!(counter.offset, 0.0);
        }
    }

    #[test]
    fn test_counter_mut_targets_one_counter() {
        let mut state = DeviceState::default();
        state.counter_mut(CounterId::B).raw = Some(7.0);
        assert_eq!(state.counter_b.raw, Some(7.0));
        assert!(state.counter_a.raw.is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_device_state_serialization() {
        let mut state = DeviceState {
            model: Some("aTick".to_string()),
            ..Default::default()
        };
        state.counter_a.raw = Some(42.5);

        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"model\":\"aTick\""));
        assert!(json.contains("\"raw\":42.5"));

        let back: DeviceState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
