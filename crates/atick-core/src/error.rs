//! Error types for atick-core.
//!
//! This module defines all error types that can occur when talking to an
//! aTick water meter, actively over GATT or passively through advertisements.
//!
//! # Error Recovery Strategies
//!
//! | Error Type | Strategy | Rationale |
//! |------------|----------|-----------|
//! | [`Error::BackoffActive`] | Try again later | Flow control after repeated connect failures |
//! | [`Error::ConnectTimeout`] | Next poll cycle | Device asleep or out of range |
//! | [`Error::Transport`] / [`Error::Bluetooth`] | Next poll cycle | Link-level failure |
//! | [`Error::LockTimeout`] | Retry soon | Another caller held the connection |
//! | [`Error::Timeout`] | Skip this read | GATT operation stalled |
//! | [`Error::CharacteristicNotFound`] | Do not retry | Firmware does not support the feature |
//! | [`Error::InvalidHexPayload`] | Do not retry | Caller supplied a bad write payload |
//! | [`Error::InvalidConfig`] | Fix configuration | Rejected at construction time |
//!
//! [`Error::MalformedAdvertisement`] is only reported by
//! [`try_decode_advertisement`](crate::codec::try_decode_advertisement); the
//! driver's passive path decodes a bad frame to zero counters instead.
//!
//! ## Backoff bookkeeping
//!
//! Only connection establishment failures ([`Error::ConnectTimeout`] and
//! transport errors raised while connecting) count towards backoff. Lock
//! contention and missing characteristics never do; see
//! [`Error::affects_backoff`].

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when communicating with aTick devices.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Too many consecutive connection failures; wait before connecting again.
    #[error(
        "Connection backoff active, retry in {:.1}s (failures: {failures})",
        .remaining.as_secs_f64()
    )]
    BackoffActive {
        /// Time left until the next attempt is allowed.
        remaining: Duration,
        /// Consecutive failures recorded so far.
        failures: u32,
    },

    /// The transport did not connect within the connect timeout.
    #[error("Timeout on connect after {duration:?}")]
    ConnectTimeout {
        /// The connect timeout that elapsed.
        duration: Duration,
    },

    /// Another caller held the connection lock for too long.
    #[error("Lock acquisition timed out after {duration:?}")]
    LockTimeout {
        /// The lock wait timeout that elapsed.
        duration: Duration,
    },

    /// A GATT operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Bluetooth Low Energy error from btleplug.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Transport failure reported by a non-btleplug backend.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The aTick service is missing on the connected device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The service UUID that was not found.
        uuid: String,
    },

    /// Required BLE characteristic not found in the aTick service.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The characteristic UUID that was not found.
        uuid: String,
    },

    /// A GATT write payload was not valid hex.
    #[error("Invalid hex data: {0}")]
    InvalidHexPayload(String),

    /// An advertisement frame could not be decoded.
    #[error("Malformed advertisement: {0}")]
    MalformedAdvertisement(String),

    /// No peripheral matching the address was seen during a scan.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Operation attempted while not connected to device.
    #[error("Not connected to device")]
    NotConnected,

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Identifier parsing error.
    #[error(transparent)]
    Parse(#[from] atick_types::ParseError),
}

impl Error {
    /// Create a transport error from any displayable failure.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl ToString) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.to_string(),
        }
    }

    /// Create a service not found error.
    pub fn service_not_found(uuid: impl ToString) -> Self {
        Self::ServiceNotFound {
            uuid: uuid.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether the error came from the underlying transport.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Bluetooth(_) | Self::Transport(_))
    }

    /// Whether the service or characteristic was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ServiceNotFound { .. } | Self::CharacteristicNotFound { .. }
        )
    }

    /// Whether a connect attempt failing with this error counts towards backoff.
    pub fn affects_backoff(&self) -> bool {
        matches!(self, Self::ConnectTimeout { .. }) || self.is_transport()
    }
}

/// Result type alias using atick-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
