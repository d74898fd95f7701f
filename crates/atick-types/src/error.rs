//! Error types for data parsing in atick-types.

use thiserror::Error;

/// Errors that can occur when parsing aTick identifiers and values.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in atick-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A string did not name counter A or counter B.
    #[error("Unknown counter key: {0}")]
    UnknownCounter(String),

    /// A MAC address was not in `XX:XX:XX:XX:XX:XX` form.
    #[error("Invalid MAC address '{0}': expected XX:XX:XX:XX:XX:XX")]
    InvalidMac(String),

    /// A PIN was not a decimal integer fitting in 32 bits.
    #[error("Invalid PIN '{0}': expected a decimal number")]
    InvalidPin(String),
}

/// Result type alias using atick-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
