//! Serialized, bounded connection management.
//!
//! [`ConnectionManager`] owns at most one live [`GattLink`] per device. All
//! callers funnel through [`ConnectionManager::acquire`], which:
//!
//! 1. refuses the attempt while connection backoff is active,
//! 2. waits at most `lock_timeout` for the connection lock,
//! 3. reuses a live link, or connects with `connect_timeout`.
//!
//! Only connect failures are recorded for backoff. Lock timeouts and missing
//! characteristics leave the failure count untouched.
//!
//! A connect that fails, times out or is cancelled never leaves a half-open
//! connection behind: the manager calls [`Transport::abort`] whenever no link
//! was stored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use atick_types::uuid::ATICK_SERVICE;

use crate::backoff::{BackoffConfig, BackoffState};
use crate::codec::{parse_hex_payload, to_hex};
use crate::error::{Error, Result};
use crate::transport::{Clock, GattLink, TokioClock, Transport};

/// Default timeout for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default bound on waiting for the connection lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for a single GATT read or write.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeouts applied to connection handling.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use atick_core::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .connect_timeout(Duration::from_secs(20))
///     .lock_timeout(Duration::from_secs(45));
/// assert_eq!(config.operation_timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Bound on establishing a connection.
    pub connect_timeout: Duration,
    /// Bound on waiting for another caller to release the connection lock.
    pub lock_timeout: Duration,
    /// Bound on each GATT read or write (enforced by the transport).
    pub operation_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Create a config with default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the lock wait timeout.
    #[must_use]
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Set the GATT operation timeout.
    #[must_use]
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

/// Observable state of a [`ConnectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No link is held.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// A link is held.
    Connected,
    /// Connect attempts are refused until the backoff delay elapses.
    BackoffBlocked,
}

/// Clears the connecting flag however the attempt ends.
struct ConnectingFlag<'a>(&'a AtomicBool);

impl<'a> ConnectingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ConnectingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the single GATT link to one device.
pub struct ConnectionManager<T: Transport> {
    address: String,
    transport: RwLock<Arc<T>>,
    link: tokio::sync::Mutex<Option<Arc<T::Link>>>,
    connected: AtomicBool,
    connecting: AtomicBool,
    backoff: Mutex<BackoffState>,
    config: ConnectionConfig,
    clock: Arc<dyn Clock>,
}

impl<T: Transport> std::fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("address", &self.address)
            .field("state", &self.state())
            .field("failures", &self.failures())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager using the tokio clock.
    pub fn new(
        address: impl Into<String>,
        transport: T,
        config: ConnectionConfig,
        backoff: BackoffConfig,
    ) -> Self {
        Self::with_clock(address, transport, config, backoff, Arc::new(TokioClock))
    }

    /// Create a manager with an explicit clock.
    pub fn with_clock(
        address: impl Into<String>,
        transport: T,
        config: ConnectionConfig,
        backoff: BackoffConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            address: address.into(),
            transport: RwLock::new(Arc::new(transport)),
            link: tokio::sync::Mutex::new(None),
            connected: AtomicBool::new(false),
            connecting: AtomicBool::new(false),
            backoff: Mutex::new(BackoffState::new(backoff)),
            config,
            clock,
        }
    }

    /// Device address this manager connects to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Timeouts in use.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        if self.connecting.load(Ordering::SeqCst) {
            ConnectionState::Connecting
        } else if self.connected.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else if self.backoff_state().is_blocked(self.clock.now()) {
            ConnectionState::BackoffBlocked
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Consecutive connect failures recorded.
    pub fn failures(&self) -> u32 {
        self.backoff_state().failures()
    }

    /// Copy of the backoff bookkeeping.
    pub fn backoff(&self) -> BackoffState {
        self.backoff_state().clone()
    }

    fn backoff_state(&self) -> std::sync::MutexGuard<'_, BackoffState> {
        self.backoff.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail with [`Error::BackoffActive`] while backoff applies.
    pub fn check_backoff(&self) -> Result<()> {
        self.backoff_state().check(self.clock.now())
    }

    /// Clear the failure count.
    pub fn reset_backoff(&self) {
        self.backoff_state().reset();
    }

    /// Record one connect failure.
    pub fn record_failure(&self) -> u32 {
        self.backoff_state().record_failure(self.clock.now())
    }

    /// Swap in a fresh transport for subsequent connects.
    ///
    /// An existing link is left alone until it is stopped or found stale.
    pub fn replace_transport(&self, transport: T) {
        let mut current = self.transport.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(transport);
        debug!(address = %self.address, "Updated transport reference");
    }

    fn current_transport(&self) -> Arc<T> {
        Arc::clone(&self.transport.read().unwrap_or_else(PoisonError::into_inner))
    }

    async fn abort_attempt(transport: &T) {
        if let Err(e) = transport.abort().await {
            debug!("Error tearing down connect attempt: {}", e);
        }
    }

    /// Get the live link, connecting if needed.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    pub async fn acquire(&self) -> Result<Arc<T::Link>> {
        self.check_backoff()?;

        let mut slot = timeout(self.config.lock_timeout, self.link.lock())
            .await
            .map_err(|_| {
                warn!(
                    "Lock acquisition timed out after {:?}",
                    self.config.lock_timeout
                );
                Error::LockTimeout {
                    duration: self.config.lock_timeout,
                }
            })?;

        if let Some(link) = slot.as_ref() {
            if link.is_connected().await {
                debug!("Connection reused");
                return Ok(Arc::clone(link));
            }
            debug!("Discarding stale connection");
            self.connected.store(false, Ordering::SeqCst);
            if let Some(stale) = slot.take()
                && let Err(e) = stale.disconnect().await
            {
                debug!("Error closing stale connection: {}", e);
            }
        }

        // A waiter that queued behind a failing attempt must honor the new count.
        self.check_backoff()?;

        debug!("Connecting to {}", self.address);
        let transport = self.current_transport();
        let attempt = {
            let _flag = ConnectingFlag::raise(&self.connecting);
            timeout(self.config.connect_timeout, transport.connect()).await
        };

        match attempt {
            Ok(Ok(link)) => {
                self.reset_backoff();
                let link = Arc::new(link);
                *slot = Some(Arc::clone(&link));
                self.connected.store(true, Ordering::SeqCst);
                debug!("Connected successfully");
                Ok(link)
            }
            Ok(Err(e)) => {
                let failures = self.record_failure();
                debug!("Error on connect (failures: {}): {}", failures, e);
                Self::abort_attempt(&transport).await;
                Err(e)
            }
            Err(_) => {
                let failures = self.record_failure();
                debug!("Timeout on connect (failures: {})", failures);
                Self::abort_attempt(&transport).await;
                Err(Error::ConnectTimeout {
                    duration: self.config.connect_timeout,
                })
            }
        }
    }

    fn resolve(link: &T::Link, characteristic: Uuid) -> Result<()> {
        if !link.has_service(ATICK_SERVICE) {
            warn!("Service {} not found", ATICK_SERVICE);
            return Err(Error::service_not_found(ATICK_SERVICE));
        }
        if !link.has_characteristic(ATICK_SERVICE, characteristic) {
            warn!(
                "Characteristic {} not found in service {}",
                characteristic, ATICK_SERVICE
            );
            return Err(Error::characteristic_not_found(characteristic));
        }
        Ok(())
    }

    /// Read a characteristic of the aTick service.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    pub async fn read_gatt(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let link = self.acquire().await?;
        Self::resolve(&link, characteristic)?;
        let data = link.read(ATICK_SERVICE, characteristic).await?;
        debug!("GATT read from {}: {}", characteristic, to_hex(&data));
        Ok(data)
    }

    /// Write a hex payload to a characteristic of the aTick service.
    ///
    /// The payload is validated before any connection is attempted.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    pub async fn write_gatt(&self, characteristic: Uuid, hex: &str) -> Result<()> {
        let data = parse_hex_payload(hex).inspect_err(|_| {
            warn!("Invalid hex data for GATT write: {}", hex);
        })?;
        let link = self.acquire().await?;
        Self::resolve(&link, characteristic)?;
        link.write(ATICK_SERVICE, characteristic, &data).await?;
        debug!("GATT write to {}: {}", characteristic, hex);
        Ok(())
    }

    /// Whether a live link is held.
    pub async fn is_connected(&self) -> bool {
        let link = self.link.lock().await.clone();
        match link {
            Some(link) => link.is_connected().await,
            None => false,
        }
    }

    /// Close the link, if any. Never fails.
    ///
    /// Without a held link the transport is still told to abort, which closes
    /// a connect that was cancelled mid-flight.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    pub async fn stop(&self) {
        let taken = match timeout(self.config.lock_timeout, self.link.lock()).await {
            Ok(mut slot) => slot.take(),
            Err(_) => {
                warn!("Could not acquire connection lock to disconnect");
                return;
            }
        };
        self.connected.store(false, Ordering::SeqCst);

        match taken {
            Some(link) => match link.disconnect().await {
                Ok(()) => debug!("Successfully disconnected from device"),
                Err(e) => debug!("Error during disconnect: {}", e),
            },
            None => Self::abort_attempt(&self.current_transport()).await,
        }
    }

    /// Close the link and log the final state.
    pub async fn shutdown(&self) {
        self.stop().await;
        info!(address = %self.address, "Connection manager stopped");
    }
}
