//! Transport abstractions for aTick device access.
//!
//! The connection manager and driver are generic over [`Transport`], so the
//! same code runs against a real btleplug peripheral
//! ([`BtleTransport`](crate::btle::BtleTransport)) and against the in-memory
//! [`MockTransport`](crate::mock::MockTransport) used in tests.
//!
//! Time is abstracted separately through [`Clock`] so backoff and polling can
//! be driven deterministically.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::Result;

/// Something that can open a GATT link to one device.
///
/// Implementations perform the raw connection only; timeouts, serialization
/// and backoff are applied by
/// [`ConnectionManager`](crate::connection::ConnectionManager).
///
/// # Example
///
/// ```ignore
/// use atick_core::{GattLink, Transport, Result};
///
/// async fn has_atick_service<T: Transport>(transport: &T) -> Result<bool> {
///     let link = transport.connect().await?;
///     let found = link.has_service(atick_core::uuid::ATICK_SERVICE);
///     link.disconnect().await?;
///     Ok(found)
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The link produced by a successful connect.
    type Link: GattLink;

    /// Establish a connection and discover services.
    async fn connect(&self) -> Result<Self::Link>;

    /// Tear down a connection left behind by a failed or abandoned
    /// [`connect`](Transport::connect).
    ///
    /// Called when no link was handed out, so there is nothing else to
    /// disconnect. Must be safe to call when nothing is connected.
    async fn abort(&self) -> Result<()> {
        Ok(())
    }
}

/// An established GATT connection.
#[async_trait]
pub trait GattLink: Send + Sync + 'static {
    /// Whether the peer exposes the given service.
    fn has_service(&self, service: Uuid) -> bool;

    /// Whether the given service exposes the given characteristic.
    fn has_characteristic(&self, service: Uuid, characteristic: Uuid) -> bool;

    /// Read a characteristic value.
    async fn read(&self, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Write a characteristic value, waiting for the peer's response.
    async fn write(&self, service: Uuid, characteristic: Uuid, data: &[u8]) -> Result<()>;

    /// Whether the link is still up.
    async fn is_connected(&self) -> bool;

    /// Close the link.
    async fn disconnect(&self) -> Result<()>;
}

/// Monotonic time source.
pub trait Clock: Send + Sync + 'static {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by [`tokio::time::Instant::now`].
///
/// Honors tokio's paused test clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced [`Clock`] for tests.
///
/// Clones share the same underlying instant.
///
/// ```
/// use std::time::Duration;
/// use atick_core::{Clock, ManualClock};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(5));
/// assert_eq!(clock.now() - start, Duration::from_secs(5));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now() - start, Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        let start = clock.now();

        other.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - start, Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock;
        let start = clock.now();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(clock.now() - start >= Duration::from_secs(3));
    }

    #[test]
    fn test_arc_clock_delegates() {
        let clock = ManualClock::new();
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        clock.advance(Duration::from_secs(1));
        assert_eq!(shared.now(), clock.now());
    }
}
