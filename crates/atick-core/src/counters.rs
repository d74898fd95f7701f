//! Shared device state with calibrated counter access.
//!
//! [`CounterModel`] wraps a [`DeviceState`] in a synchronous lock. Every
//! mutation is a single critical section and no lock is held across an
//! await, so the passive advertisement path never suspends and readers never
//! observe a half-applied counter pair.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use atick_types::{CounterId, DeviceInfo, DeviceState};

use crate::codec::ParsedAdvertisement;
use crate::error::{Error, Result};

/// Point-in-time view of a device, with displayed values precomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Raw state.
    pub state: DeviceState,
    /// Displayed counter A, if known.
    pub counter_a_display: Option<f64>,
    /// Displayed counter B, if known.
    pub counter_b_display: Option<f64>,
}

impl DeviceSnapshot {
    /// Displayed value of one counter.
    pub fn display_value(&self, id: CounterId) -> Option<f64> {
        match id {
            CounterId::A => self.counter_a_display,
            CounterId::B => self.counter_b_display,
        }
    }
}

/// Thread-safe device state.
#[derive(Debug, Default)]
pub struct CounterModel {
    state: RwLock<DeviceState>,
}

impl CounterModel {
    /// Create a model with default calibration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a model from an initial state.
    pub fn with_state(state: DeviceState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, DeviceState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DeviceState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the full state.
    pub fn state(&self) -> DeviceState {
        self.read().clone()
    }

    /// Consistent snapshot including displayed values.
    pub fn snapshot(&self) -> DeviceSnapshot {
        let state = self.state();
        DeviceSnapshot {
            counter_a_display: state.counter_a.display_value(),
            counter_b_display: state.counter_b.display_value(),
            state,
        }
    }

    /// Displayed value (`raw * ratio + offset`, 3 decimals).
    pub fn display_value(&self, id: CounterId) -> Option<f64> {
        self.read().counter(id).display_value()
    }

    /// Raw device value.
    pub fn raw_value(&self, id: CounterId) -> Option<f64> {
        self.read().counter(id).raw
    }

    /// Current ratio.
    pub fn ratio(&self, id: CounterId) -> f64 {
        self.read().counter(id).ratio
    }

    /// Current offset.
    pub fn offset(&self, id: CounterId) -> f64 {
        self.read().counter(id).offset
    }

    /// Metadata read over GATT.
    pub fn info(&self) -> DeviceInfo {
        self.read().info()
    }

    /// Set the raw value so the counter displays `displayed`.
    pub fn set_display_value(&self, id: CounterId, displayed: f64) -> Result<()> {
        check_display_value(displayed)?;
        let mut state = self.write();
        let counter = state.counter_mut(id);
        counter.raw = Some(counter.raw_from_display(displayed));
        debug!("Set {} to {} (raw: {:?})", id, displayed, counter.raw);
        Ok(())
    }

    /// Administrative reset to `displayed`.
    ///
    /// The only operation expected to move a counter backwards.
    pub fn reset_counter(&self, id: CounterId, displayed: f64) -> Result<()> {
        check_display_value(displayed)?;
        let mut state = self.write();
        let counter = state.counter_mut(id);
        let previous = counter.display_value();
        counter.raw = Some(counter.raw_from_display(displayed));
        info!(
            "Reset {} from {:?} to {} (raw: {:?})",
            id, previous, displayed, counter.raw
        );
        Ok(())
    }

    /// Update both raw values from an advertisement.
    ///
    /// Returns whether anything changed. All-zero advertisements are ignored.
    pub fn apply_advertisement(&self, parsed: &ParsedAdvertisement) -> bool {
        let total = parsed.counter_a.unwrap_or(0.0) + parsed.counter_b.unwrap_or(0.0);
        if total <= 0.0 {
            return false;
        }

        let mut state = self.write();
        if parsed.counter_a == state.counter_a.raw && parsed.counter_b == state.counter_b.raw {
            return false;
        }

        for (id, new) in [(CounterId::A, parsed.counter_a), (CounterId::B, parsed.counter_b)] {
            if let (Some(old), Some(new)) = (state.counter(id).raw, new)
                && new < old
            {
                warn!("{} decreased from {} to {}", id, old, new);
            }
        }

        state.counter_a.raw = parsed.counter_a;
        state.counter_b.raw = parsed.counter_b;
        debug!(
            "Updated from advertisement: A={:?}, B={:?}",
            parsed.counter_a, parsed.counter_b
        );
        true
    }

    /// Replace both raw values (from a GATT read).
    pub fn set_raw_values(&self, a: f64, b: f64) {
        let mut state = self.write();
        state.counter_a.raw = Some(a);
        state.counter_b.raw = Some(b);
    }

    /// Set one counter's ratio.
    pub fn set_ratio(&self, id: CounterId, ratio: f64) -> Result<()> {
        if !ratio.is_finite() || ratio == 0.0 {
            return Err(Error::invalid_config(format!(
                "{} must be finite and non-zero",
                id.ratio_key()
            )));
        }
        self.write().counter_mut(id).ratio = ratio;
        Ok(())
    }

    /// Set one counter's offset.
    pub fn set_offset(&self, id: CounterId, offset: f64) -> Result<()> {
        if !offset.is_finite() {
            return Err(Error::invalid_config(format!(
                "{} must be finite",
                id.offset_key()
            )));
        }
        self.write().counter_mut(id).offset = offset;
        Ok(())
    }

    /// Store metadata; `None` fields keep their previous value.
    pub fn set_metadata(&self, info: DeviceInfo) {
        let mut state = self.write();
        if let Some(model) = info.model {
            state.model = Some(model);
        }
        if let Some(manufacturer) = info.manufacturer {
            state.manufacturer = Some(manufacturer);
        }
        if let Some(firmware) = info.firmware_version {
            state.firmware_version = Some(firmware);
        }
    }
}

fn check_display_value(displayed: f64) -> Result<()> {
    if !displayed.is_finite() || displayed < 0.0 {
        return Err(Error::invalid_config("counter value must be >= 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn parsed(a: f64, b: f64) -> ParsedAdvertisement {
        ParsedAdvertisement::from((a, b))
    }

    #[test]
    fn test_display_value_uses_calibration() {
        let model = CounterModel::new();
        assert_eq!(model.display_value(CounterId::A), None);

        model.set_raw_values(100.0, 250.0);
        assert_eq!(model.display_value(CounterId::A), Some(1.0));
        assert_eq!(model.display_value(CounterId::B), Some(2.5));

        model.set_offset(CounterId::A, 10.0).unwrap();
        assert_eq!(model.display_value(CounterId::A), Some(11.0));
    }

    #[test]
    fn test_set_display_value() {
        let model = CounterModel::new();
        model.set_offset(CounterId::B, 10.0).unwrap();
        model.set_display_value(CounterId::B, 15.0).unwrap();

        assert_eq!(model.raw_value(CounterId::B), Some(500.0));
        assert_eq!(model.display_value(CounterId::B), Some(15.0));
        assert_eq!(model.raw_value(CounterId::A), None);
    }

    #[test]
    fn test_set_display_value_rejects_negative() {
        let model = CounterModel::new();
        let err = model.set_display_value(CounterId::A, -1.0).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(model.set_display_value(CounterId::A, f64::NAN).is_err());
        assert_eq!(model.raw_value(CounterId::A), None);
    }

    #[test]
    fn test_reset_counter_to_zero() {
        let model = CounterModel::new();
        model.set_offset(CounterId::A, 2.0).unwrap();
        model.set_raw_values(5000.0, 0.0);

        model.reset_counter(CounterId::A, 0.0).unwrap();
        assert_eq!(model.raw_value(CounterId::A), Some(-200.0));
        assert_eq!(model.display_value(CounterId::A), Some(0.0));
    }

    #[test]
    fn test_reset_counter_rejects_negative() {
        let model = CounterModel::new();
        assert!(model.reset_counter(CounterId::B, -0.5).is_err());
    }

    #[test]
    fn test_apply_advertisement_changes() {
        let model = CounterModel::new();
        assert!(model.apply_advertisement(&parsed(12.5, 3.0)));
        assert_eq!(model.raw_value(CounterId::A), Some(12.5));
        assert_eq!(model.raw_value(CounterId::B), Some(3.0));

        // Same values again.
        assert!(!model.apply_advertisement(&parsed(12.5, 3.0)));
        // One counter moved.
        assert!(model.apply_advertisement(&parsed(12.5, 3.1)));
    }

    #[test]
    fn test_apply_advertisement_ignores_all_zero() {
        let model = CounterModel::new();
        model.set_raw_values(10.0, 20.0);
        assert!(!model.apply_advertisement(&parsed(0.0, 0.0)));
        assert!(!model.apply_advertisement(&ParsedAdvertisement::default()));
        assert_eq!(model.raw_value(CounterId::A), Some(10.0));
    }

    #[test]
    fn test_apply_advertisement_accepts_decrease() {
        let model = CounterModel::new();
        model.set_raw_values(10.0, 20.0);
        assert!(model.apply_advertisement(&parsed(9.0, 20.0)));
        assert_eq!(model.raw_value(CounterId::A), Some(9.0));
    }

    #[test]
    fn test_set_ratio_validation() {
        let model = CounterModel::new();
        assert!(model.set_ratio(CounterId::A, 0.0).is_err());
        assert!(model.set_ratio(CounterId::A, f64::INFINITY).is_err());
        model.set_ratio(CounterId::A, 0.001).unwrap();
        assert_eq!(model.ratio(CounterId::A), 0.001);
        assert!(model.set_offset(CounterId::A, f64::NAN).is_err());
    }

    #[test]
    fn test_set_metadata_keeps_unset_fields() {
        let model = CounterModel::new();
        model.set_metadata(DeviceInfo {
            model: Some("aTick".to_string()),
            manufacturer: Some("Deembot".to_string()),
            firmware_version: None,
        });
        model.set_metadata(DeviceInfo {
            model: None,
            manufacturer: None,
            firmware_version: Some("1.0.0".to_string()),
        });

        let info = model.info();
        assert_eq!(info.model.as_deref(), Some("aTick"));
        assert_eq!(info.manufacturer.as_deref(), Some("Deembot"));
        assert_eq!(info.firmware_version.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_snapshot_serializes() {
        let model = CounterModel::new();
        model.set_raw_values(12345.0, 50.0);
        let snapshot = model.snapshot();
        assert_eq!(snapshot.display_value(CounterId::A), Some(123.45));
        assert_eq!(snapshot.counter_b_display, Some(0.5));

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"counter_a_display\":123.45"));
    }

    #[test]
    fn test_snapshot_never_torn() {
        let model = Arc::new(CounterModel::new());
        let writer = {
            let model = Arc::clone(&model);
            std::thread::spawn(move || {
                for i in 1..=1000 {
                    let v = f64::from(i);
                    model.apply_advertisement(&parsed(v, v));
                }
            })
        };

        for _ in 0..1000 {
            let state = model.snapshot().state;
            assert_eq!(state.counter_a.raw, state.counter_b.raw);
        }
        writer.join().unwrap();
    }
}
