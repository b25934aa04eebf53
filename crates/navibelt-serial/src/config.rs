//! Serial transport configuration

use std::time::Duration;

use navibelt_core::config::duration_ms;

/// Baud rate of the belt's USB-serial interface
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the serial transport
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SerialTransportConfig {
    pub baud_rate: u32,
    /// Poll interval of blocking port reads
    #[serde(with = "duration_ms")]
    pub read_timeout: Duration,
    /// A record not completed within this time is dropped
    #[serde(with = "duration_ms")]
    pub packet_timeout: Duration,
    /// Input discarded after opening, zero to skip
    #[serde(with = "duration_ms")]
    pub initial_flush: Duration,
    /// Send a mode query on open so the belt switches to binary records
    pub wake_up: bool,
    pub read_buffer_size: usize,
}

impl Default for SerialTransportConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(500),
            packet_timeout: Duration::from_millis(2500),
            initial_flush: Duration::from_millis(1500),
            wake_up: true,
            read_buffer_size: 256,
        }
    }
}

impl SerialTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_packet_timeout(mut self, timeout: Duration) -> Self {
        self.packet_timeout = timeout;
        self
    }

    /// Set how long input is discarded after opening
    pub fn with_initial_flush(mut self, duration: Duration) -> Self {
        self.initial_flush = duration;
        self
    }

    pub fn with_wake_up(mut self, enabled: bool) -> Self {
        self.wake_up = enabled;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SerialTransportConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.packet_timeout, Duration::from_millis(2500));
        assert_eq!(config.initial_flush, Duration::from_millis(1500));
        assert!(config.wake_up);
    }

    #[test]
    fn test_partial_toml() {
        let config: SerialTransportConfig = toml::from_str("initial_flush = 0\nread_buffer_size = 64").unwrap();
        assert!(config.initial_flush.is_zero());
        assert_eq!(config.read_buffer_size, 64);
        assert_eq!(config.packet_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_buffer_size_never_zero() {
        assert_eq!(SerialTransportConfig::new().with_read_buffer_size(0).read_buffer_size, 1);
    }
}
