//! Config command implementation.

use std::path::Path;

use anyhow::{Context, Result, bail};
use bluecentral_core::CentralConfig;

use crate::cli::ConfigAction;
use crate::config::{Config, DEFAULT_SCAN_DURATION_SECS, TimeoutConfig};

pub fn cmd_config(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
            if content.trim().is_empty() {
                println!("(empty configuration)");
            } else {
                print!("{}", content);
            }
        }
        ConfigAction::Path => {
            println!("{}", Config::path().display());
        }
        ConfigAction::Init => {
            let path = Config::path();
            init_at(&path)?;
            println!("Created {}", path.display());
        }
    }
    Ok(())
}

/// A config file with every default spelled out.
fn initial_config() -> Config {
    let defaults = CentralConfig::default();
    Config {
        scan_duration: Some(DEFAULT_SCAN_DURATION_SECS),
        timeouts: TimeoutConfig {
            connect: Some(defaults.connect_timeout.as_secs()),
            rssi: Some(defaults.rssi_timeout.as_secs()),
            discovery: Some(defaults.discovery_timeout.as_secs()),
            scan: Some(defaults.scan_timeout.as_secs()),
        },
        ..Config::default()
    }
}

fn init_at(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("Config file already exists: {}", path.display());
    }
    initial_config().save_to(path)
}
