//! Engine configuration.
//!
//! Loaded from a JSON document; every field is optional and falls back to
//! its default. Unknown fields are rejected so typos surface at startup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config field `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Connectivity debounce window.
    pub stability_window_ms: u64,
    /// Bound on every remote read and write.
    pub remote_timeout_ms: u64,
    /// Safety-net flush period; `None` disables the timer.
    pub periodic_flush_secs: Option<u64>,
    /// Key of the durable queue document in the local KV store.
    pub queue_storage_key: String,
    pub record_temperature_history: bool,
    /// Buffer of the sync-notice broadcast channel.
    pub notice_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stability_window_ms: 2_000,
            remote_timeout_ms: 8_000,
            periodic_flush_secs: Some(300),
            queue_storage_key: "pendingDailyRecords".to_string(),
            record_temperature_history: true,
            notice_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stability_window_ms == 0 {
            return Err(invalid("stability_window_ms", "must be greater than zero"));
        }
        if self.remote_timeout_ms == 0 {
            return Err(invalid("remote_timeout_ms", "must be greater than zero"));
        }
        if self.periodic_flush_secs == Some(0) {
            return Err(invalid(
                "periodic_flush_secs",
                "must be greater than zero or null",
            ));
        }
        if self.queue_storage_key.trim().is_empty() {
            return Err(invalid("queue_storage_key", "cannot be empty"));
        }
        if self.notice_capacity == 0 {
            return Err(invalid("notice_capacity", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn stability_window(&self) -> Duration {
        Duration::from_millis(self.stability_window_ms)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn periodic_flush(&self) -> Option<Duration> {
        self.periodic_flush_secs.map(Duration::from_secs)
    }
}

fn invalid(field: &'static str, message: &'static str) -> ConfigError {
    ConfigError::Invalid { field, message }
}
