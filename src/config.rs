//! Transport configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration. Durations are expressed in milliseconds; `0` disables the
//! corresponding timeout.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound accepted for `msize`.
const MAX_MSIZE: u32 = 64 * 1024 * 1024;

/// Envelope bytes: size[4] type[1] tag[2].
pub const HEADER_SIZE: u32 = 7;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for one [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    /// Capacity of the queue between callers and the coordinator.
    pub submit_queue: usize,
    /// Capacity of the queue between the reader and the coordinator.
    pub frame_queue: usize,
    /// Maximum frame size accepted or produced by the stream channel.
    pub msize: u32,
    /// Protocol version string offered in `Tversion`.
    pub version: String,
    /// Per-read timeout on the stream channel. Expiry is a transient fault.
    pub read_timeout_ms: u64,
    /// Upper bound on a single round trip, enforced by the caller side.
    pub request_timeout_ms: u64,
    /// How long `flush` waits for the server's `Rflush`.
    pub flush_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            submit_queue: 1,
            frame_queue: 16,
            msize: 8192,
            version: "9P2000".to_string(),
            read_timeout_ms: 0,
            request_timeout_ms: 0,
            flush_timeout_ms: 5000,
        }
    }
}

impl TransportConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: TransportConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.submit_queue == 0 {
            return Err(ConfigError::Invalid("submit_queue must be at least 1".into()));
        }
        if self.frame_queue == 0 {
            return Err(ConfigError::Invalid("frame_queue must be at least 1".into()));
        }
        if self.msize <= HEADER_SIZE || self.msize > MAX_MSIZE {
            return Err(ConfigError::Invalid(format!(
                "msize must be in {}..={}, got {}",
                HEADER_SIZE + 1,
                MAX_MSIZE,
                self.msize
            )));
        }
        if self.version.is_empty() {
            return Err(ConfigError::Invalid("version must not be empty".into()));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        millis(self.read_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        millis(self.request_timeout_ms)
    }

    pub fn flush_timeout(&self) -> Option<Duration> {
        millis(self.flush_timeout_ms)
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
