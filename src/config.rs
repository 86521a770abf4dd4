//! Engine configuration.
//!
//! Loaded from a JSON file; any missing key falls back to its default.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default number of attempts for a unit of work hitting storage contention.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default linear backoff step between attempts, in milliseconds.
pub const DEFAULT_BACKOFF_MS: u64 = 25;

/// Default upper bound on a single notification delivery, in milliseconds.
pub const DEFAULT_NOTIFY_TIMEOUT_MS: u64 = 2_000;

/// Retry policy for contended units of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Backoff step; attempt `n` waits `n * backoff_ms`.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_ms: DEFAULT_BACKOFF_MS,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// SQLite pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Maximum pooled connections.
    pub max_connections: u32,

    /// How long a writer waits for the database lock.
    pub busy_timeout_secs: u64,

    /// How long to wait for a free pooled connection.
    pub acquire_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout_secs: 30,
            acquire_timeout_secs: 10,
        }
    }
}

/// Workflow engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retry: RetryConfig,

    pub storage: StorageConfig,

    /// Upper bound on a single notification delivery.
    pub notify_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            storage: StorageConfig::default(),
            notify_timeout_ms: DEFAULT_NOTIFY_TIMEOUT_MS,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::internal(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.retry.max_attempts == 0 {
            return Err(AppError::invalid_input_field(
                "must be at least 1",
                "retry.max_attempts",
            ));
        }
        if self.storage.max_connections == 0 {
            return Err(AppError::invalid_input_field(
                "must be at least 1",
                "storage.max_connections",
            ));
        }
        Ok(())
    }

    /// Notification delivery timeout as a duration.
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}
