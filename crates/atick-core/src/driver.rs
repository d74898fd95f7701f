//! Per-device driver.
//!
//! [`DeviceDriver`] combines the two data paths of an aTick meter:
//!
//! - **Passive**: advertisements are decoded synchronously with
//!   [`DeviceDriver::on_advertisement`] and never touch the connection.
//! - **Active**: [`DeviceDriver::active_update`] connects, refreshes metadata
//!   (and optionally ratios and counter values) and always disconnects.
//!
//! The host decides when to run an active session by asking
//! [`DeviceDriver::poll_due`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use atick_types::uuid::{
    COUNTERS_RATIO, COUNTERS_VALUE, FIRMWARE_REVISION, MANUFACTURER_NAME, MODEL_NUMBER,
};
use atick_types::{CounterId, DeviceInfo, DeviceState};

use crate::codec::{
    ParsedAdvertisement, decode_advertisement, decode_float_pair, decode_ratio_pair,
    decode_string, select_manufacturer_payload, select_manufacturer_payload_from_map,
};
use crate::config::{DriverConfig, RatioSource};
use crate::connection::{ConnectionManager, ConnectionState};
use crate::counters::{CounterModel, DeviceSnapshot};
use crate::error::{Error, Result};
use crate::guard::SessionGuard;
use crate::transport::{Clock, TokioClock, Transport};

/// Driver for one aTick device.
pub struct DeviceDriver<T: Transport> {
    config: DriverConfig,
    model: CounterModel,
    connection: Arc<ConnectionManager<T>>,
    last_active: Mutex<Option<Instant>>,
    stopped: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl<T: Transport> std::fmt::Debug for DeviceDriver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceDriver")
            .field("address", &self.config.address)
            .field("name", &self.config.name)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> DeviceDriver<T> {
    /// Create a driver from a validated configuration.
    pub fn new(config: DriverConfig, transport: T) -> Result<Self> {
        Self::with_clock(config, transport, Arc::new(TokioClock))
    }

    /// Create a driver with an explicit clock.
    pub fn with_clock(
        config: DriverConfig,
        transport: T,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::invalid_config(e.to_string()))?;

        let mut state = DeviceState::default();
        for id in CounterId::ALL {
            let counter = state.counter_mut(id);
            counter.ratio = config.ratio(id);
            counter.offset = config.offset(id);
        }

        let connection = Arc::new(ConnectionManager::with_clock(
            config.address.clone(),
            transport,
            config.connection_config(),
            config.backoff_config(),
            Arc::clone(&clock),
        ));

        Ok(Self {
            config,
            model: CounterModel::with_state(state),
            connection,
            last_active: Mutex::new(None),
            stopped: AtomicBool::new(false),
            clock,
        })
    }

    // --- Identity ---

    /// Device MAC address.
    pub fn address(&self) -> &str {
        &self.config.address
    }

    /// Friendly name, if configured.
    pub fn name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    /// Configured PIN.
    pub fn pin(&self) -> &str {
        &self.config.pin
    }

    /// The configuration in use.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    // --- State ---

    /// Displayed counter value.
    pub fn display_value(&self, id: CounterId) -> Option<f64> {
        self.model.display_value(id)
    }

    /// Raw counter value.
    pub fn raw_value(&self, id: CounterId) -> Option<f64> {
        self.model.raw_value(id)
    }

    /// Model number.
    pub fn model(&self) -> Option<String> {
        self.model.info().model
    }

    /// Manufacturer name.
    pub fn manufacturer(&self) -> Option<String> {
        self.model.info().manufacturer
    }

    /// Firmware version.
    pub fn firmware_version(&self) -> Option<String> {
        self.model.info().firmware_version
    }

    /// Consistent view of the device state.
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.model.snapshot()
    }

    /// The counter model.
    pub fn counters(&self) -> &CounterModel {
        &self.model
    }

    /// When the last active session ended.
    pub fn last_active_update(&self) -> Option<Instant> {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The connection manager.
    pub fn connection(&self) -> &Arc<ConnectionManager<T>> {
        &self.connection
    }

    /// Whether [`cleanup`](Self::cleanup) has run.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    // --- Polling ---

    /// Whether an active session is due.
    ///
    /// A recent passive update (`seconds_since_last_passive` under the poll
    /// interval) suppresses polling. Otherwise a session is due if none has
    /// run yet or the last one ended more than one interval ago.
    pub fn poll_due(&self, seconds_since_last_passive: Option<f64>, now: Instant) -> bool {
        let interval = self.config.poll_interval();
        if let Some(seconds) = seconds_since_last_passive
            && seconds < interval.as_secs_f64()
        {
            return false;
        }
        match self.last_active_update() {
            None => true,
            Some(last) => now.saturating_duration_since(last) > interval,
        }
    }

    /// Run one active session.
    ///
    /// Only a failure to connect aborts the session; individual reads are
    /// best-effort. The connection is stopped and the poll time stamped on
    /// every exit path.
    #[tracing::instrument(level = "info", skip_all, fields(address = %self.config.address))]
    pub async fn active_update(&self, cancel: &CancellationToken) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::Cancelled);
        }

        let guard = SessionGuard::new(Arc::clone(&self.connection));
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.run_session() => result,
        };
        guard.release().await;
        let ended = self.clock.now();
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner) = Some(ended);

        match &result {
            Ok(()) => info!("Active update completed"),
            Err(Error::Cancelled) => info!("Active update cancelled"),
            Err(e) if e.affects_backoff() => warn!(
                failures = self.connection.failures(),
                "Active update failed: {}",
                e
            ),
            Err(e) => warn!("Active update failed: {}", e),
        }
        result
    }

    async fn run_session(&self) -> Result<()> {
        self.connection.acquire().await?;

        let info = DeviceInfo {
            model: self.read_string(MODEL_NUMBER, "model").await,
            manufacturer: self.read_string(MANUFACTURER_NAME, "manufacturer").await,
            firmware_version: self
                .read_string(FIRMWARE_REVISION, "firmware version")
                .await,
        };
        debug!("Device info: {:?}", info);
        self.model.set_metadata(info);

        if self.config.ratio_source == RatioSource::Device {
            self.update_ratios().await;
        }
        if self.config.read_counter_values {
            self.update_counter_values().await;
        }
        Ok(())
    }

    async fn read_optional(&self, characteristic: Uuid, what: &str) -> Option<Vec<u8>> {
        match self.connection.read_gatt(characteristic).await {
            Ok(data) if data.is_empty() => {
                debug!("Empty {} value", what);
                None
            }
            Ok(data) => Some(data),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                debug!("Could not read {}: {}", what, e);
                None
            }
        }
    }

    async fn read_string(&self, characteristic: Uuid, what: &str) -> Option<String> {
        self.read_optional(characteristic, what)
            .await
            .map(|data| decode_string(&data))
    }

    async fn update_ratios(&self) {
        let Some(data) = self.read_optional(COUNTERS_RATIO, "counter ratios").await else {
            return;
        };
        let Some((a, b)) = decode_ratio_pair(&data) else {
            warn!("Could not decode counter ratios from {} bytes", data.len());
            return;
        };
        for (id, ratio) in [(CounterId::A, a), (CounterId::B, b)] {
            if ratio == 0.0 {
                warn!("Device reported zero ratio for {}, keeping current", id);
                continue;
            }
            if let Err(e) = self.model.set_ratio(id, ratio) {
                warn!("Ignoring ratio {} for {}: {}", ratio, id, e);
            }
        }
        debug!("Updated ratios: A={}, B={}", a, b);
    }

    async fn update_counter_values(&self) {
        let Some(data) = self.read_optional(COUNTERS_VALUE, "counter values").await else {
            return;
        };
        match decode_float_pair(&data) {
            Some((a, b)) => {
                self.model.set_raw_values(a, b);
                debug!("Updated counter values: A={}, B={}", a, b);
            }
            None => warn!("Could not decode counter values from {} bytes", data.len()),
        }
    }

    // --- Passive path ---

    /// Decode an advertisement payload with this device's address.
    ///
    /// Uses the configured PIN when none is given. Never blocks.
    pub fn parse_advertisement(
        &self,
        pin: Option<&str>,
        payload: Option<&[u8]>,
    ) -> ParsedAdvertisement {
        let pin = pin.unwrap_or(&self.config.pin);
        decode_advertisement(payload, pin, &self.config.address).into()
    }

    /// Apply manufacturer data from an advertisement.
    ///
    /// Entries are in arrival order; the last one is used. Returns whether
    /// the counters changed.
    pub fn on_advertisement(
        &self,
        pin: Option<&str>,
        manufacturer_data: &[(u16, Vec<u8>)],
    ) -> bool {
        let Some(payload) = select_manufacturer_payload(manufacturer_data) else {
            return false;
        };
        let parsed = self.parse_advertisement(pin, Some(payload));
        self.model.apply_advertisement(&parsed)
    }

    /// Apply manufacturer data as reported by btleplug, with the configured PIN.
    pub fn on_manufacturer_data(&self, manufacturer_data: &HashMap<u16, Vec<u8>>) -> bool {
        let Some(payload) = select_manufacturer_payload_from_map(manufacturer_data) else {
            return false;
        };
        let parsed = self.parse_advertisement(Some(&self.config.pin), Some(payload));
        self.model.apply_advertisement(&parsed)
    }

    // --- Commands ---

    /// Set a counter so that it displays `displayed`.
    pub fn set_counter_value(&self, id: CounterId, displayed: f64) -> Result<()> {
        self.model.set_display_value(id, displayed)?;
        info!(
            "Set {} to {} m³ (raw: {:?})",
            id.value_key(),
            displayed,
            self.model.raw_value(id)
        );
        Ok(())
    }

    /// Reset a counter, typically to zero after a meter replacement.
    pub fn reset_counter(&self, id: CounterId, displayed: f64) -> Result<()> {
        self.model.reset_counter(id, displayed)
    }

    /// Set a counter addressed by a legacy key such as `counter_a_value`.
    pub fn set_counter_value_by_key(&self, key: &str, displayed: f64) -> Result<()> {
        let id: CounterId = key.parse()?;
        self.set_counter_value(id, displayed)
    }

    /// Write a hex payload to a characteristic of the aTick service.
    pub async fn write_gatt(&self, characteristic: Uuid, hex: &str) -> Result<()> {
        self.connection.write_gatt(characteristic, hex).await
    }

    // --- Lifecycle ---

    /// Swap in a fresh transport for the next connection.
    pub fn update_transport(&self, transport: T) {
        self.connection.replace_transport(transport);
    }

    /// Release the connection and refuse further active sessions. Idempotent.
    pub async fn cleanup(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!(address = %self.config.address, "Cleaning up driver");
        }
        self.connection.shutdown().await;
    }
}
