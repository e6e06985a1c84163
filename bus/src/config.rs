//! Configuration for the request bus
//!
//! Values come from defaults, an optional TOML document, then environment
//! overrides, and are validated before the hub starts.
//!
//! # Example
//!
//! ```no_run
//! use promptbus::config::BusConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BusConfig::from_toml_str("max_visible_notifications = 5")?
//!     .with_env_overrides()?;
//! config.validate()?;
//!
//! println!("Notifications stay for {:?}", config.notification_duration());
//! # Ok(())
//! # }
//! ```

use promptbus_runtime::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Override for [`BusConfig::max_visible_notifications`]
pub const ENV_MAX_VISIBLE: &str = "PROMPTBUS_MAX_VISIBLE_NOTIFICATIONS";
/// Override for [`BusConfig::notification_duration_ms`]
pub const ENV_DURATION_MS: &str = "PROMPTBUS_NOTIFICATION_DURATION_MS";
/// Override for [`BusConfig::positive_action_threshold`]
pub const ENV_THRESHOLD: &str = "PROMPTBUS_POSITIVE_ACTION_THRESHOLD";

/// Configuration error
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// TOML could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override is not a valid number
    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
    },

    /// A value is out of range
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Tunables of the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Notifications shown at once
    pub max_visible_notifications: usize,
    /// How long a notification stays, in milliseconds
    pub notification_duration_ms: u64,
    /// Positive actions before the app-rating request is emitted
    pub positive_action_threshold: u32,
    /// Actions buffered per store for slow renderers
    pub action_broadcast_capacity: usize,
    /// How long shutdown waits for in-flight effects, in milliseconds
    pub shutdown_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_visible_notifications: 3,
            notification_duration_ms: 6_000,
            positive_action_threshold: 10,
            action_broadcast_capacity: 64,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl BusConfig {
    /// Parse a TOML document; missing keys keep their defaults
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or mistyped values.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if it is not valid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Apply `PROMPTBUS_*` environment overrides
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] if a set variable is not a number.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides looked up through `lookup` (variable name to value)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] if a present value is not a number.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_override(&lookup, ENV_MAX_VISIBLE)? {
            self.max_visible_notifications = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_DURATION_MS)? {
            self.notification_duration_ms = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_THRESHOLD)? {
            self.positive_action_threshold = value;
        }
        Ok(self)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_visible_notifications == 0 {
            return Err(ConfigError::Validation(
                "max_visible_notifications must be > 0".to_string(),
            ));
        }
        if self.notification_duration_ms == 0 {
            return Err(ConfigError::Validation(
                "notification_duration_ms must be > 0".to_string(),
            ));
        }
        if self.positive_action_threshold == 0 {
            return Err(ConfigError::Validation(
                "positive_action_threshold must be > 0".to_string(),
            ));
        }
        if self.action_broadcast_capacity == 0 {
            return Err(ConfigError::Validation(
                "action_broadcast_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Notification display duration
    #[must_use]
    pub const fn notification_duration(&self) -> Duration {
        Duration::from_millis(self.notification_duration_ms)
    }

    /// Shutdown timeout
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Store configuration derived from these settings
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::default()
            .with_broadcast_capacity(self.action_broadcast_capacity)
            .with_shutdown_timeout(self.shutdown_timeout())
    }
}

fn parse_override<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}
