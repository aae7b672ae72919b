//! Runtime configuration loaded from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8080";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 30_000;
pub const DEFAULT_MAX_RECONNECTS: u32 = 5;
pub const DEFAULT_FAST_FAILURE_MS: u64 = 1_000;
pub const DEFAULT_THROTTLE_MS: u64 = 50;

/// Error type for configuration loading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set to something that does not parse.
    #[error("invalid value for {var}: `{value}`")]
    Invalid { var: &'static str, value: String },
}

/// Reconnect policy for one scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first reconnect attempt.
    pub base: Duration,
    /// Upper bound for any single delay.
    pub cap: Duration,
    /// Reconnect attempts before giving up.
    pub max_attempts: u32,
    /// A close sooner than this after the attempt began is treated as a
    /// rejection (bad token, unknown channel) and never retried.
    pub fast_failure: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            cap: Duration::from_millis(DEFAULT_BACKOFF_CAP_MS),
            max_attempts: DEFAULT_MAX_RECONNECTS,
            fast_failure: Duration::from_millis(DEFAULT_FAST_FAILURE_MS),
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect attempt `attempt + 1`: `min(base * 2^attempt, cap)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Endpoints plus timing knobs for one client session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// Websocket base; scope paths (`/ws/system`, `/ws/{channel}`) are appended.
    pub ws_url: String,
    /// HTTP API base.
    pub api_url: String,
    pub backoff: BackoffPolicy,
    /// Trailing window for partial sketch updates.
    pub throttle_window: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_owned(),
            api_url: DEFAULT_API_URL.to_owned(),
            backoff: BackoffPolicy::default(),
            throttle_window: Duration::from_millis(DEFAULT_THROTTLE_MS),
        }
    }
}

impl SyncConfig {
    /// Load from the process environment. Unset or empty variables keep defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a set variable that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a set variable that does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        let millis = |var: &'static str, default: u64| -> Result<Duration, ConfigError> {
            match get(var) {
                Some(raw) => raw.parse().map(Duration::from_millis).map_err(|_| ConfigError::Invalid { var, value: raw }),
                None => Ok(Duration::from_millis(default)),
            }
        };

        let max_attempts = match get("SKETCHSYNC_MAX_RECONNECTS") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid { var: "SKETCHSYNC_MAX_RECONNECTS", value: raw })?,
            None => DEFAULT_MAX_RECONNECTS,
        };

        Ok(Self {
            ws_url: base_url(get("SKETCHSYNC_WS_URL"), DEFAULT_WS_URL),
            api_url: base_url(get("SKETCHSYNC_API_URL"), DEFAULT_API_URL),
            backoff: BackoffPolicy {
                base: millis("SKETCHSYNC_BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS)?,
                cap: millis("SKETCHSYNC_BACKOFF_CAP_MS", DEFAULT_BACKOFF_CAP_MS)?,
                max_attempts,
                fast_failure: millis("SKETCHSYNC_FAST_FAILURE_MS", DEFAULT_FAST_FAILURE_MS)?,
            },
            throttle_window: millis("SKETCHSYNC_THROTTLE_MS", DEFAULT_THROTTLE_MS)?,
        })
    }
}

fn base_url(value: Option<String>, default: &str) -> String {
    value.as_deref().unwrap_or(default).trim_end_matches('/').to_owned()
}
