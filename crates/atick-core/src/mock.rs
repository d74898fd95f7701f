//! Mock transport for testing.
//!
//! [`MockTransport`] implements [`Transport`] with an in-memory GATT table,
//! so connection handling and driver sessions can be exercised without BLE
//! hardware.
//!
//! # Features
//!
//! - **Failure injection**: fail the next N connects, fail service discovery
//!   after the peer has connected, fail reads of chosen characteristics, fail
//!   disconnects
//! - **Latency simulation**: delay connects and reads to exercise timeouts
//!   and cancellation
//! - **Call accounting**: count connects, reads, writes and disconnects
//!
//! Clones share state, so a test can keep a handle after moving the
//! transport into a manager.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use atick_types::uuid::{
    ATICK_SERVICE, COMMAND, COUNTERS, COUNTERS_RATIO, COUNTERS_VALUE, FIRMWARE_REVISION,
    MANUFACTURER_NAME, MODE, MODEL_NUMBER, OPTIONS, PIN,
};

use crate::error::{Error, Result};
use crate::transport::{GattLink, Transport};

/// Encode two values the way the device stores float pairs.
pub fn encode_float_pair(a: f32, b: f32) -> Vec<u8> {
    let mut data = Vec::with_capacity(8);
    data.extend_from_slice(&a.to_le_bytes());
    data.extend_from_slice(&b.to_le_bytes());
    data
}

/// Call counters shared by a transport and all of its links.
#[derive(Debug, Default)]
pub struct MockStats {
    connects: AtomicU32,
    reads: AtomicU32,
    writes: AtomicU32,
    disconnects: AtomicU32,
    aborts: AtomicU32,
}

impl MockStats {
    /// Connect attempts, successful or not.
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Characteristic reads.
    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Characteristic writes.
    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Disconnect calls.
    pub fn disconnects(&self) -> u32 {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Teardowns of abandoned connect attempts.
    pub fn aborts(&self) -> u32 {
        self.aborts.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct MockState {
    values: Mutex<HashMap<Uuid, Vec<u8>>>,
    failing_reads: Mutex<HashSet<Uuid>>,
    service_present: AtomicBool,
    remaining_connect_failures: AtomicU32,
    remaining_discovery_failures: AtomicU32,
    peer_connected: AtomicBool,
    connect_latency_ms: AtomicU64,
    discovery_latency_ms: AtomicU64,
    read_latency_ms: AtomicU64,
    disconnect_fails: AtomicBool,
    stats: Arc<MockStats>,
}

impl MockState {
    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Vec<u8>>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn failing_reads(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        self.failing_reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A mock aTick device reachable over a fake GATT link.
///
/// # Example
///
/// ```
/// use atick_core::{MockTransport, Transport, GattLink};
/// use atick_core::uuid::{ATICK_SERVICE, MODEL_NUMBER};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let transport = MockTransport::new();
/// let link = transport.connect().await.unwrap();
/// let model = link.read(ATICK_SERVICE, MODEL_NUMBER).await.unwrap();
/// assert_eq!(model, b"aTick");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a device exposing all aTick characteristics with default values.
    ///
    /// Ratios are `0.01`, counter values are zero.
    pub fn new() -> Self {
        let mut values = HashMap::new();
        values.insert(MODEL_NUMBER, b"aTick".to_vec());
        values.insert(MANUFACTURER_NAME, b"Deembot".to_vec());
        values.insert(FIRMWARE_REVISION, b"1.0.0".to_vec());
        values.insert(COUNTERS_RATIO, encode_float_pair(0.01, 0.01));
        values.insert(COUNTERS_VALUE, encode_float_pair(0.0, 0.0));
        for uuid in [PIN, OPTIONS, COMMAND, COUNTERS, MODE] {
            values.insert(uuid, Vec::new());
        }

        Self {
            state: Arc::new(MockState {
                values: Mutex::new(values),
                failing_reads: Mutex::new(HashSet::new()),
                service_present: AtomicBool::new(true),
                remaining_connect_failures: AtomicU32::new(0),
                remaining_discovery_failures: AtomicU32::new(0),
                peer_connected: AtomicBool::new(false),
                connect_latency_ms: AtomicU64::new(0),
                discovery_latency_ms: AtomicU64::new(0),
                read_latency_ms: AtomicU64::new(0),
                disconnect_fails: AtomicBool::new(false),
                stats: Arc::new(MockStats::default()),
            }),
        }
    }

    /// Set the counters-value characteristic.
    #[must_use]
    pub fn with_counter_values(self, a: f32, b: f32) -> Self {
        self.set_value(COUNTERS_VALUE, encode_float_pair(a, b));
        self
    }

    /// Set the counters-ratio characteristic.
    #[must_use]
    pub fn with_ratios(self, a: f32, b: f32) -> Self {
        self.set_value(COUNTERS_RATIO, encode_float_pair(a, b));
        self
    }

    /// Shared call counters.
    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.state.stats)
    }

    /// Set (or add) a characteristic value.
    pub fn set_value(&self, characteristic: Uuid, data: Vec<u8>) {
        self.state.values().insert(characteristic, data);
    }

    /// Current value of a characteristic.
    pub fn value(&self, characteristic: Uuid) -> Option<Vec<u8>> {
        self.state.values().get(&characteristic).cloned()
    }

    /// Remove a characteristic from the GATT table.
    pub fn remove_characteristic(&self, characteristic: Uuid) {
        self.state.values().remove(&characteristic);
    }

    /// Expose or hide the aTick service.
    pub fn set_service_present(&self, present: bool) {
        self.state.service_present.store(present, Ordering::SeqCst);
    }

    /// Fail the next `count` connect attempts with a transport error.
    pub fn set_connect_failures(&self, count: u32) {
        self.state
            .remaining_connect_failures
            .store(count, Ordering::SeqCst);
    }

    /// Connect failures still pending.
    pub fn remaining_connect_failures(&self) -> u32 {
        self.state.remaining_connect_failures.load(Ordering::SeqCst)
    }

    /// Delay every connect by `latency`.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.state
            .connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Fail service discovery on the next `count` connects.
    ///
    /// The peer is left connected, as a BLE stack does when discovery fails.
    pub fn set_discovery_failures(&self, count: u32) {
        self.state
            .remaining_discovery_failures
            .store(count, Ordering::SeqCst);
    }

    /// Delay service discovery, after the peer has connected, by `latency`.
    pub fn set_discovery_latency(&self, latency: Duration) {
        self.state
            .discovery_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Whether the peer side of the connection is up.
    ///
    /// Raised when a connect reaches the peer, lowered by a link disconnect
    /// or by [`Transport::abort`].
    pub fn is_peer_connected(&self) -> bool {
        self.state.peer_connected.load(Ordering::SeqCst)
    }

    /// Delay every read by `latency`.
    pub fn set_read_latency(&self, latency: Duration) {
        self.state
            .read_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make reads of one characteristic fail with a transport error.
    pub fn set_read_failure(&self, characteristic: Uuid, fail: bool) {
        let mut failing = self.state.failing_reads();
        if fail {
            failing.insert(characteristic);
        } else {
            failing.remove(&characteristic);
        }
    }

    /// Make disconnects report an error (the link still goes down).
    pub fn set_disconnect_fails(&self, fail: bool) {
        self.state.disconnect_fails.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Link = MockLink;

    async fn connect(&self) -> Result<MockLink> {
        let latency = self.state.connect_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        self.state.stats.connects.fetch_add(1, Ordering::SeqCst);

        let pending = self.state.remaining_connect_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.state
                .remaining_connect_failures
                .store(pending - 1, Ordering::SeqCst);
            return Err(Error::transport("Mock connect failure"));
        }
        self.state.peer_connected.store(true, Ordering::SeqCst);

        let latency = self.state.discovery_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let pending = self.state.remaining_discovery_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.state
                .remaining_discovery_failures
                .store(pending - 1, Ordering::SeqCst);
            return Err(Error::transport("Mock discovery failure"));
        }

        Ok(MockLink {
            state: Arc::clone(&self.state),
            connected: AtomicBool::new(true),
        })
    }

    async fn abort(&self) -> Result<()> {
        self.state.stats.aborts.fetch_add(1, Ordering::SeqCst);
        self.state.peer_connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Link produced by [`MockTransport`].
#[derive(Debug)]
pub struct MockLink {
    state: Arc<MockState>,
    connected: AtomicBool,
}

impl MockLink {
    /// Simulate the peer going out of range.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn check_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn check_characteristic(&self, service: Uuid, characteristic: Uuid) -> Result<()> {
        if self.has_characteristic(service, characteristic) {
            Ok(())
        } else {
            Err(Error::characteristic_not_found(characteristic))
        }
    }
}

#[async_trait]
impl GattLink for MockLink {
    fn has_service(&self, service: Uuid) -> bool {
        service == ATICK_SERVICE && self.state.service_present.load(Ordering::SeqCst)
    }

    fn has_characteristic(&self, service: Uuid, characteristic: Uuid) -> bool {
        self.has_service(service) && self.state.values().contains_key(&characteristic)
    }

    async fn read(&self, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>> {
        let latency = self.state.read_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.check_connected()?;
        self.check_characteristic(service, characteristic)?;
        self.state.stats.reads.fetch_add(1, Ordering::SeqCst);

        if self.state.failing_reads().contains(&characteristic) {
            return Err(Error::transport(format!(
                "Mock read failure for {characteristic}"
            )));
        }
        self.state
            .values()
            .get(&characteristic)
            .cloned()
            .ok_or_else(|| Error::characteristic_not_found(characteristic))
    }

    async fn write(&self, service: Uuid, characteristic: Uuid, data: &[u8]) -> Result<()> {
        self.check_connected()?;
        self.check_characteristic(service, characteristic)?;
        self.state.stats.writes.fetch_add(1, Ordering::SeqCst);
        self.state.values().insert(characteristic, data.to_vec());
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.stats.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.state.peer_connected.store(false, Ordering::SeqCst);
        if self.state.disconnect_fails.load(Ordering::SeqCst) {
            return Err(Error::transport("Mock disconnect failure"));
        }
        Ok(())
    }
}
