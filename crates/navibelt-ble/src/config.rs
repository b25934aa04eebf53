//! BLE transport configuration

use std::time::Duration;

use navibelt_core::config::duration_ms;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the BLE transport
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BleTransportConfig {
    /// How long a scan collects advertisements
    #[serde(with = "duration_ms")]
    pub scan_timeout: Duration,
    /// Maximum time to wait for the link and service discovery
    #[serde(with = "duration_ms")]
    pub connection_timeout: Duration,
    /// Whether writes wait for the link-layer response
    pub write_with_response: bool,
    /// Only accept belts whose advertised name starts with this prefix
    pub name_prefix: Option<String>,
}

impl Default for BleTransportConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(5),
            connection_timeout: Duration::from_secs(10),
            write_with_response: true,
            name_prefix: None,
        }
    }
}

impl BleTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set scan timeout
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_write_with_response(mut self, enabled: bool) -> Self {
        self.write_with_response = enabled;
        self
    }

    /// Restrict scans to belts with a name prefix
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BleTransportConfig::default();
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert!(config.write_with_response);
        assert!(config.name_prefix.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config: BleTransportConfig = toml::from_str(
            r#"
            connection_timeout = 2500
            write_with_response = false
            "#,
        )
        .unwrap();
        assert_eq!(config.connection_timeout, Duration::from_millis(2500));
        assert!(!config.write_with_response);
        assert_eq!(config.scan_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_builders() {
        let config = BleTransportConfig::new()
            .with_scan_timeout(Duration::from_secs(1))
            .with_name_prefix("naviGuertel");
        assert_eq!(config.scan_timeout, Duration::from_secs(1));
        assert_eq!(config.name_prefix.as_deref(), Some("naviGuertel"));
    }
}
