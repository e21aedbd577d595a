//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use bluecentral_core::{CentralConfig, ScanOptions};
use bluecentral_types::uuids::parse_uuid;
use serde::{Deserialize, Serialize};

use crate::cli::ScanArgs;

/// Default scan duration when neither flag nor config sets one
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 10;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Default peripheral address for `probe`
    #[serde(default)]
    pub device: Option<String>,

    /// Scan duration in seconds
    #[serde(default)]
    pub scan_duration: Option<u64>,

    /// Service UUIDs to filter scans by
    #[serde(default)]
    pub services: Vec<String>,

    /// Report every advertisement instead of only changes
    #[serde(default)]
    pub allow_duplicates: bool,

    /// Operation timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Timeouts in seconds. Unset values use the library defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default)]
    pub connect: Option<u64>,
    #[serde(default)]
    pub rssi: Option<u64>,
    #[serde(default)]
    pub discovery: Option<u64>,
    #[serde(default)]
    pub scan: Option<u64>,
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bluecentral")
            .join("config.toml")
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from a specific file, or return default if not found
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("Warning: Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    eprintln!("Warning: Failed to read config: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    /// Save config to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Session manager settings, library defaults filling the gaps.
    pub fn central_config(&self) -> Result<CentralConfig> {
        let mut config = CentralConfig::default();
        if let Some(secs) = self.timeouts.connect {
            config = config.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.timeouts.rssi {
            config = config.rssi_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.timeouts.discovery {
            config = config.discovery_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.timeouts.scan {
            config = config.scan_timeout(Duration::from_secs(secs));
        }
        config.validate().context("Invalid timeouts in config")?;
        Ok(config)
    }

    /// Scan options from flags, falling back to the config file.
    ///
    /// A service filter given on the command line replaces the configured
    /// one; `--allow-duplicates` can only switch duplicates on.
    pub fn scan_options(&self, args: &ScanArgs) -> Result<ScanOptions> {
        let services = if args.services.is_empty() {
            &self.services
        } else {
            &args.services
        };
        let uuids = parse_uuids(services)?;
        Ok(ScanOptions::default()
            .services(uuids)
            .allow_duplicates(args.allow_duplicates || self.allow_duplicates))
    }

    /// Scan duration from flags, falling back to the config file.
    pub fn scan_duration(&self, args: &ScanArgs) -> Duration {
        Duration::from_secs(
            args.duration
                .or(self.scan_duration)
                .unwrap_or(DEFAULT_SCAN_DURATION_SECS),
        )
    }
}

/// Parse a list of textual service UUIDs.
pub fn parse_uuids(values: &[String]) -> Result<Vec<uuid::Uuid>> {
    values
        .iter()
        .map(|s| parse_uuid(s).with_context(|| format!("Invalid service UUID '{}'", s)))
        .collect()
}

/// Resolve the probe target from arg (or env var), then config.
pub fn resolve_device(device: Option<String>, config: &Config) -> Option<String> {
    device
        .filter(|d| !d.is_empty())
        .or_else(|| config.device.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluecentral_core::config::DEFAULT_CONNECT_TIMEOUT;
    use bluecentral_types::uuids::{BATTERY_SERVICE, HEART_RATE_SERVICE};

    fn scan_args() -> ScanArgs {
        ScanArgs {
            duration: None,
            services: Vec::new(),
            allow_duplicates: false,
        }
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            device: Some("AA:BB:CC:DD:EE:FF".to_string()),
            scan_duration: Some(5),
            services: vec!["180d".to_string()],
            allow_duplicates: true,
            timeouts: TimeoutConfig {
                connect: Some(20),
                ..Default::default()
            },
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load_from(&dir.path().join("absent.toml")), Config::default());
    }

    #[test]
    fn test_load_invalid_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "scan_duration = \"soon\"").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_partial_file() {
        let config: Config = toml::from_str("[timeouts]\nrssi = 3\n").unwrap();
        assert_eq!(config.timeouts.rssi, Some(3));
        assert!(config.services.is_empty());

        let central = config.central_config().unwrap();
        assert_eq!(central.rssi_timeout, Duration::from_secs(3));
        assert_eq!(central.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config: Config = toml::from_str("[timeouts]\nconnect = 0\n").unwrap();
        assert!(config.central_config().is_err());
    }

    #[test]
    fn test_flag_services_replace_config() {
        let config = Config {
            services: vec!["180f".to_string()],
            ..Default::default()
        };
        let from_config = config.scan_options(&scan_args()).unwrap();
        assert_eq!(from_config.service_uuids, vec![BATTERY_SERVICE]);

        let args = ScanArgs {
            services: vec!["0x180D".to_string()],
            ..scan_args()
        };
        let from_flags = config.scan_options(&args).unwrap();
        assert_eq!(from_flags.service_uuids, vec![HEART_RATE_SERVICE]);
    }

    #[test]
    fn test_invalid_service_rejected() {
        let args = ScanArgs {
            services: vec!["not-a-uuid".to_string()],
            ..scan_args()
        };
        let err = Config::default().scan_options(&args).unwrap_err();
        assert!(err.to_string().contains("not-a-uuid"));
    }

    #[test]
    fn test_allow_duplicates_either_source() {
        let config = Config {
            allow_duplicates: true,
            ..Default::default()
        };
        assert!(config.scan_options(&scan_args()).unwrap().allow_duplicates);

        let args = ScanArgs {
            allow_duplicates: true,
            ..scan_args()
        };
        assert!(Config::default().scan_options(&args).unwrap().allow_duplicates);
        assert!(!Config::default().scan_options(&scan_args()).unwrap().allow_duplicates);
    }

    #[test]
    fn test_scan_duration_precedence() {
        let config = Config {
            scan_duration: Some(4),
            ..Default::default()
        };
        assert_eq!(config.scan_duration(&scan_args()), Duration::from_secs(4));
        let args = ScanArgs {
            duration: Some(2),
            ..scan_args()
        };
        assert_eq!(config.scan_duration(&args), Duration::from_secs(2));
        assert_eq!(
            Config::default().scan_duration(&scan_args()),
            Duration::from_secs(DEFAULT_SCAN_DURATION_SECS)
        );
    }

    #[test]
    fn test_resolve_device() {
        let config = Config {
            device: Some("11:22:33:44:55:66".to_string()),
            ..Default::default()
        };
        assert_eq!(
            resolve_device(Some("AA:BB".to_string()), &config).as_deref(),
            Some("AA:BB")
        );
        assert_eq!(
            resolve_device(None, &config).as_deref(),
            Some("11:22:33:44:55:66")
        );
        assert_eq!(
            resolve_device(Some(String::new()), &config).as_deref(),
            Some("11:22:33:44:55:66")
        );
        assert!(resolve_device(None, &Config::default()).is_none());
    }
}
