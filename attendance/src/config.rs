//! Configuration for the check-in and RSVP coordinators.
//!
//! Loads timing values from environment variables with the product defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

const MINT_INTERVAL_VAR: &str = "ROLLCALL_MINT_INTERVAL_MS";
const SCAN_THROTTLE_VAR: &str = "ROLLCALL_SCAN_THROTTLE_MS";
const COOLDOWN_VAR: &str = "ROLLCALL_COOLDOWN_MS";
const SETTLE_TIMEOUT_VAR: &str = "ROLLCALL_SETTLE_TIMEOUT_MS";

/// Timing configuration shared by the coordinators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInConfig {
    /// Period between mint requests while a token is presented (default: 10s)
    pub mint_interval: Duration,
    /// Minimum spacing between scan-handling cycles (default: 900ms)
    pub scan_throttle: Duration,
    /// How long a terminal scan outcome is shown before re-arming (default: 1.2s)
    pub cooldown: Duration,
    /// How long an RSVP call waits for its mutation to settle (default: 30s)
    pub settle_timeout: Duration,
}

impl Default for CheckInConfig {
    fn default() -> Self {
        Self {
            mint_interval: Duration::from_millis(10_000),
            scan_throttle: Duration::from_millis(900),
            cooldown: Duration::from_millis(1_200),
            settle_timeout: Duration::from_millis(30_000),
        }
    }
}

impl CheckInConfig {
    /// Load configuration from environment variables.
    ///
    /// Absent variables use defaults. Malformed values are logged and also
    /// fall back to defaults; use [`CheckInConfig::try_from_env`] to refuse them.
    #[must_use]
    pub fn from_env() -> Self {
        match Self::try_from_env() {
            Ok(config) => config,
            Err(error) => {
                tracing::warn!(%error, "Ignoring malformed check-in configuration");
                Self::default()
            },
        }
    }

    /// Load configuration from environment variables, refusing malformed values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable is present but is not
    /// a positive integer number of milliseconds.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |var: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            lookup(var).map_or(Ok(default), |raw| parse_millis(var, &raw))
        };

        Ok(Self {
            mint_interval: read(MINT_INTERVAL_VAR, defaults.mint_interval)?,
            scan_throttle: read(SCAN_THROTTLE_VAR, defaults.scan_throttle)?,
            cooldown: read(COOLDOWN_VAR, defaults.cooldown)?,
            settle_timeout: read(SETTLE_TIMEOUT_VAR, defaults.settle_timeout)?,
        })
    }

    /// Set the mint refresh period
    #[must_use]
    pub const fn with_mint_interval(mut self, interval: Duration) -> Self {
        self.mint_interval = interval;
        self
    }

    /// Set the scan throttle window
    #[must_use]
    pub const fn with_scan_throttle(mut self, throttle: Duration) -> Self {
        self.scan_throttle = throttle;
        self
    }

    /// Set the post-outcome cooldown
    #[must_use]
    pub const fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set the RSVP settle timeout
    #[must_use]
    pub const fn with_settle_timeout(mut self, timeout: Duration) -> Self {
        self.settle_timeout = timeout;
        self
    }
}

fn parse_millis(var: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        var,
        value: raw.to_string(),
        reason,
    };

    match raw.trim().parse::<u64>() {
        Ok(0) => Err(invalid("must be greater than zero".to_string())),
        Ok(ms) => Ok(Duration::from_millis(ms)),
        Err(e) => Err(invalid(e.to_string())),
    }
}
