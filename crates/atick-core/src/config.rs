//! Driver configuration.
//!
//! A [`DriverConfig`] describes one device, loaded from TOML:
//!
//! ```toml
//! address = "AA:BB:CC:DD:EE:FF"
//! pin = "123456"
//! poll_interval = 86400
//! ratio_source = "fixed"
//! counter_a_ratio = 0.01
//!
//! [connection]
//! connect_timeout = 15
//!
//! [backoff]
//! max_failures = 5
//! base_delay = 2.0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use atick_types::{CounterId, DEFAULT_COUNTER_RATIO, DEFAULT_PIN};

use crate::backoff::BackoffConfig;
use crate::codec::parse_mac;
use crate::connection::ConnectionConfig;

/// Minimum poll interval in seconds (1 minute).
pub const MIN_POLL_INTERVAL: u64 = 60;

/// Default poll interval in seconds (1 day).
pub const DEFAULT_POLL_INTERVAL: u64 = 86_400;

fn default_pin() -> String {
    DEFAULT_PIN.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL
}

fn default_ratio() -> f64 {
    DEFAULT_COUNTER_RATIO
}

/// Where counter ratios come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatioSource {
    /// Use the configured ratios.
    #[default]
    Fixed,
    /// Refresh ratios from the device on every active update.
    Device,
}

/// Configuration for one aTick device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Device MAC address.
    pub address: String,
    /// Friendly name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// PIN used to de-obfuscate advertisements.
    #[serde(default = "default_pin")]
    pub pin: String,
    /// Seconds between active sessions.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Where counter ratios come from.
    #[serde(default)]
    pub ratio_source: RatioSource,
    /// Ratio of counter A.
    #[serde(default = "default_ratio")]
    pub counter_a_ratio: f64,
    /// Ratio of counter B.
    #[serde(default = "default_ratio")]
    pub counter_b_ratio: f64,
    /// Offset of counter A, in displayed units.
    #[serde(default)]
    pub counter_a_offset: f64,
    /// Offset of counter B, in displayed units.
    #[serde(default)]
    pub counter_b_offset: f64,
    /// Also read counter values over GATT during active sessions.
    #[serde(default)]
    pub read_counter_values: bool,
    /// Connection timeouts.
    #[serde(default)]
    pub connection: ConnectionSettings,
    /// Connection backoff.
    #[serde(default)]
    pub backoff: BackoffSettings,
}

impl DriverConfig {
    /// Configuration with defaults for the given address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            pin: default_pin(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            ratio_source: RatioSource::default(),
            counter_a_ratio: DEFAULT_COUNTER_RATIO,
            counter_b_ratio: DEFAULT_COUNTER_RATIO,
            counter_a_offset: 0.0,
            counter_b_offset: 0.0,
            read_counter_values: false,
            connection: ConnectionSettings::default(),
            backoff: BackoffSettings::default(),
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return every problem found.
    ///
    /// ```
    /// use atick_core::DriverConfig;
    ///
    /// DriverConfig::new("AA:BB:CC:DD:EE:FF").validate().unwrap();
    /// assert!(DriverConfig::new("not-a-mac").validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push(ValidationError::new("address", "device address cannot be empty"));
        } else if parse_mac(&self.address).is_err() {
            errors.push(ValidationError::new(
                "address",
                format!(
                    "'{}' is not a MAC address (expected XX:XX:XX:XX:XX:XX)",
                    self.address
                ),
            ));
        }

        if self.pin.is_empty()
            || !self.pin.bytes().all(|b| b.is_ascii_digit())
            || self.pin.parse::<u32>().is_err()
        {
            errors.push(ValidationError::new(
                "pin",
                format!("'{}' is not a decimal PIN", self.pin),
            ));
        }

        if self.poll_interval < MIN_POLL_INTERVAL {
            errors.push(ValidationError::new(
                "poll_interval",
                format!(
                    "poll interval {} is too short (minimum {} seconds)",
                    self.poll_interval, MIN_POLL_INTERVAL
                ),
            ));
        }

        for id in CounterId::ALL {
            let ratio = self.ratio(id);
            if !ratio.is_finite() || ratio == 0.0 {
                errors.push(ValidationError::new(
                    id.ratio_key(),
                    format!("ratio {} must be finite and non-zero", ratio),
                ));
            }
            let offset = self.offset(id);
            if !offset.is_finite() {
                errors.push(ValidationError::new(
                    id.offset_key(),
                    format!("offset {} must be finite", offset),
                ));
            }
        }

        errors.extend(self.connection.validate());
        errors.extend(self.backoff.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Configured ratio of one counter.
    pub fn ratio(&self, id: CounterId) -> f64 {
        match id {
            CounterId::A => self.counter_a_ratio,
            CounterId::B => self.counter_b_ratio,
        }
    }

    /// Configured offset of one counter.
    pub fn offset(&self, id: CounterId) -> f64 {
        match id {
            CounterId::A => self.counter_a_offset,
            CounterId::B => self.counter_b_offset,
        }
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    /// Connection timeouts for the connection manager.
    pub fn connection_config(&self) -> ConnectionConfig {
        self.connection.to_config()
    }

    /// Backoff thresholds for the connection manager.
    pub fn backoff_config(&self) -> BackoffConfig {
        self.backoff.to_config()
    }
}

/// Connection timeouts, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Bound on establishing a connection.
    pub connect_timeout: u64,
    /// Bound on waiting for the connection lock.
    pub lock_timeout: u64,
    /// Bound on each GATT operation.
    pub operation_timeout: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let config = ConnectionConfig::default();
        Self {
            connect_timeout: config.connect_timeout.as_secs(),
            lock_timeout: config.lock_timeout.as_secs(),
            operation_timeout: config.operation_timeout.as_secs(),
        }
    }
}

impl ConnectionSettings {
    /// Validate connection settings.
    pub fn validate(&self) -> Vec<ValidationError> {
        [
            ("connection.connect_timeout", self.connect_timeout),
            ("connection.lock_timeout", self.lock_timeout),
            ("connection.operation_timeout", self.operation_timeout),
        ]
        .into_iter()
        .filter(|(_, value)| *value == 0)
        .map(|(field, _)| ValidationError::new(field, "timeout must be greater than 0"))
        .collect()
    }

    fn to_config(&self) -> ConnectionConfig {
        ConnectionConfig::new()
            .connect_timeout(Duration::from_secs(self.connect_timeout))
            .lock_timeout(Duration::from_secs(self.lock_timeout))
            .operation_timeout(Duration::from_secs(self.operation_timeout))
    }
}

/// Connection backoff thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    /// Consecutive failures tolerated before backoff applies.
    pub max_failures: u32,
    /// Base delay in seconds.
    pub base_delay: f64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        let config = BackoffConfig::default();
        Self {
            max_failures: config.max_failures,
            base_delay: config.base_delay.as_secs_f64(),
        }
    }
}

impl BackoffSettings {
    /// Validate backoff settings.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.max_failures == 0 {
            errors.push(ValidationError::new(
                "backoff.max_failures",
                "max_failures must be at least 1",
            ));
        }
        if !self.base_delay.is_finite() || self.base_delay <= 0.0 {
            errors.push(ValidationError::new(
                "backoff.base_delay",
                format!("base delay {} must be greater than 0", self.base_delay),
            ));
        }
        errors
    }

    fn to_config(&self) -> BackoffConfig {
        let base_delay = Duration::try_from_secs_f64(self.base_delay)
            .unwrap_or_else(|_| BackoffConfig::default().base_delay);
        BackoffConfig::new(self.max_failures, base_delay)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path (e.g., `address` or `connection.lock_timeout`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}
