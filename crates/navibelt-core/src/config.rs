//! Session configuration
//!
//! Durations are written in milliseconds in TOML files:
//!
//! ```toml
//! ack_timeout = 2000
//! queue_policy = "fifo"
//! disconnect_timeout = 10000
//! handshake = true
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{BeltError, Result};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Behavior of the command engine when a command is already in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Wait for earlier commands, resolving in submission order
    #[default]
    Fifo,
    /// Fail immediately with `EngineBusy`
    FailFast,
}

/// Configuration of a belt session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeltConfig {
    /// Bounded wait for an acknowledgment
    #[serde(with = "duration_ms")]
    pub ack_timeout: Duration,
    pub queue_policy: QueuePolicy,
    /// Bounded wait for the link to report closure after a disconnect request
    #[serde(with = "duration_ms")]
    pub disconnect_timeout: Duration,
    /// Read device parameters and subscribe notifications on connect
    pub handshake: bool,
}

impl Default for BeltConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(2),
            queue_policy: QueuePolicy::Fifo,
            disconnect_timeout: Duration::from_secs(10),
            handshake: true,
        }
    }
}

impl BeltConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set acknowledgment timeout
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Set queue policy
    pub fn with_queue_policy(mut self, policy: QueuePolicy) -> Self {
        self.queue_policy = policy;
        self
    }

    /// Set disconnect timeout
    pub fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Enable or disable the connect handshake
    pub fn with_handshake(mut self, enabled: bool) -> Self {
        self.handshake = enabled;
        self
    }

    /// Parse configuration from TOML, missing keys take their defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: BeltConfig = toml::from_str(source).map_err(|e| BeltError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| BeltError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!("Loaded belt configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ack_timeout.is_zero() {
            return Err(BeltError::Config("ack_timeout must be positive".into()));
        }
        if self.disconnect_timeout.is_zero() {
            return Err(BeltError::Config("disconnect_timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Serde adapter storing a `Duration` as integer milliseconds
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
