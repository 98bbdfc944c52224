//! Configuration for the synchronizer and its collaborators.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use star_sync_core::toggle::{DEFAULT_DEBOUNCE, ToggleConfig};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Synchronizer configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Debounce window in milliseconds (default: 500)
    pub debounce_ms: u64,
    /// How long shutdown waits for in-flight writes, in seconds (default: 5)
    pub shutdown_timeout_secs: u64,
    /// Preference API configuration
    pub api: ApiConfig,
}

/// Preference API configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the API, e.g. `https://api.example.com/v1` (unset: no HTTP service)
    pub base_url: Option<String>,
    /// Bearer token sent with every request
    pub auth_token: Option<String>,
    /// Request timeout in seconds (default: 10)
    pub timeout_secs: u64,
}

impl SyncConfig {
    /// Load configuration from environment variables
    ///
    /// Falls back to defaults for missing values. Values that fail to parse
    /// are logged and replaced by their default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    #[must_use]
    pub fn from_source<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let debounce_default = u64::try_from(DEFAULT_DEBOUNCE.as_millis()).unwrap_or(500);

        Self {
            debounce_ms: parse_or(&lookup, "STAR_SYNC_DEBOUNCE_MS", debounce_default),
            shutdown_timeout_secs: parse_or(&lookup, "STAR_SYNC_SHUTDOWN_TIMEOUT_SECS", 5),
            api: ApiConfig {
                base_url: lookup("STAR_SYNC_API_URL").filter(|url| !url.trim().is_empty()),
                auth_token: lookup("STAR_SYNC_API_TOKEN").filter(|token| !token.is_empty()),
                timeout_secs: parse_or(&lookup, "STAR_SYNC_HTTP_TIMEOUT_SECS", 10),
            },
        }
    }

    /// Synchronizer tunables
    #[must_use]
    pub const fn toggle_config(&self) -> ToggleConfig {
        ToggleConfig::new(Duration::from_millis(self.debounce_ms))
    }

    /// Shutdown grace period
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl ApiConfig {
    /// Request timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_source(|_| None)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };

    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!(key, value = %raw, default = %default, "Invalid config value, using default");
        default
    })
}
