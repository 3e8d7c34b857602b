//! Queue configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default micro-tier capacity before a drain compacts its storage.
pub const DEFAULT_MICRO_CAPACITY: usize = 1024;

/// Default period of the watchdog interval used by the timer strategy.
pub const DEFAULT_WATCHDOG_INTERVAL_MS: u64 = 50;

/// Settings for a `TaskQueue`.
///
/// Missing fields fall back to their defaults, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Attach causal stacks to enqueued tasks.
    pub long_stacks: bool,

    /// Processed micro entries after which the drain compacts.
    /// 0 disables compaction.
    pub micro_capacity: usize,

    /// Watchdog interval of the timer strategy, in milliseconds.
    pub watchdog_interval_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid queue config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            long_stacks: false,
            micro_capacity: DEFAULT_MICRO_CAPACITY,
            watchdog_interval_ms: DEFAULT_WATCHDOG_INTERVAL_MS,
        }
    }
}

impl QueueConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }
}
