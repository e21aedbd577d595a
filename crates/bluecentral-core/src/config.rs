//! Session manager configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default timeout for establishing a BLE connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for an RSSI read.
pub const DEFAULT_RSSI_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for service discovery.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for asking the transport to start or stop a scan.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeouts applied to every transport request issued by a
/// [`Central`](crate::Central).
///
/// Use this to customize timeout values for different environments.
/// For example, increase timeouts in challenging RF environments
/// (concrete walls, electromagnetic interference).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use bluecentral_core::CentralConfig;
///
/// let config = CentralConfig::default()
///     .connect_timeout(Duration::from_secs(20))
///     .rssi_timeout(Duration::from_secs(5));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralConfig {
    /// Timeout for establishing a BLE connection.
    pub connect_timeout: Duration,
    /// Timeout for an RSSI read.
    pub rssi_timeout: Duration,
    /// Timeout for service discovery.
    pub discovery_timeout: Duration,
    /// Timeout for scan start and stop requests.
    pub scan_timeout: Duration,
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            rssi_timeout: DEFAULT_RSSI_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }
}

impl CentralConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config for challenging RF environments.
    ///
    /// Uses longer timeouts to accommodate signal interference,
    /// thick walls, or long distances.
    pub fn challenging_environment() -> Self {
        Self {
            connect_timeout: Duration::from_secs(25),
            rssi_timeout: Duration::from_secs(15),
            discovery_timeout: Duration::from_secs(15),
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the RSSI read timeout.
    #[must_use]
    pub fn rssi_timeout(mut self, timeout: Duration) -> Self {
        self.rssi_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the scan start/stop timeout.
    #[must_use]
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Reject configurations that would make every request fail.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("connect_timeout", self.connect_timeout),
            ("rssi_timeout", self.rssi_timeout),
            ("discovery_timeout", self.discovery_timeout),
            ("scan_timeout", self.scan_timeout),
        ];
        for (name, value) in checks {
            if value.is_zero() {
                return Err(Error::invalid_config(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CentralConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.rssi_timeout, Duration::from_secs(10));
        assert_eq!(config.discovery_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = CentralConfig::new()
            .connect_timeout(Duration::from_secs(3))
            .discovery_timeout(Duration::from_secs(4))
            .scan_timeout(Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.discovery_timeout, Duration::from_secs(4));
        assert_eq!(config.scan_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = CentralConfig::default()
            .rssi_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(ref m) if m.contains("rssi_timeout")));
    }

    #[test]
    fn test_challenging_environment_is_slower() {
        let slow = CentralConfig::challenging_environment();
        let normal = CentralConfig::default();
        assert!(slow.connect_timeout > normal.connect_timeout);
        assert!(slow.validate().is_ok());
    }
}
