//! Configuration Module
//!
//! Handles cache configuration, either built in code or loaded from environment variables.

use std::env;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Default entry lifetime in milliseconds.
pub const DEFAULT_TTL_MS: u64 = 300_000;

/// Default interval between background sweeps in milliseconds.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;

/// Cache configuration parameters.
///
/// Immutable once handed to a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Lifetime applied to every new entry; zero means entries never expire
    pub ttl: Duration,
    /// Interval of the background sweeper; `None` disables it
    pub sweep_interval: Option<Duration>,
}

impl CacheConfig {
    /// Creates a config with the given TTL and the default sweep interval.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sweep_interval: Some(Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS)),
        }
    }

    /// Sets the background sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Disables the background sweeper; expiry is then purely lazy.
    pub fn without_sweeper(mut self) -> Self {
        self.sweep_interval = None;
        self
    }

    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_TTL_MS` - Entry lifetime in milliseconds, 0 disables expiry (default: 300000)
    /// - `CACHE_SWEEP_INTERVAL_MS` - Sweep frequency in milliseconds, 0 disables the sweeper (default: 1000)
    pub fn from_env() -> Self {
        let ttl_ms = env::var("CACHE_TTL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TTL_MS);
        let sweep_ms = env::var("CACHE_SWEEP_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_MS);

        Self {
            ttl: Duration::from_millis(ttl_ms),
            sweep_interval: (sweep_ms > 0).then(|| Duration::from_millis(sweep_ms)),
        }
    }

    /// Checks that the configuration can drive a cache.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(CacheError::InvalidConfig(
                "sweep interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns true if entries created under this config never expire.
    pub fn is_immortal(&self) -> bool {
        self.ttl.is_zero()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_TTL_MS))
    }
}
