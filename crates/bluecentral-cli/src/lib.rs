//! Command-line front end for the bluecentral BLE session manager.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scan` | Scan for nearby peripherals |
//! | `probe` | Connect, read RSSI, discover services and disconnect |
//! | `config` | Show, locate or initialize the configuration file |
//!
//! Both `scan` and `probe` accept `--simulate` to run against a scripted
//! radio instead of the first Bluetooth adapter.
//!
//! # Configuration
//!
//! The CLI reads `~/.config/bluecentral/config.toml` (or platform
//! equivalent). Flags override the file.
//!
//! ```toml
//! device = "C0:FF:EE:00:00:01"
//! scan_duration = 10
//! services = ["180d"]
//! allow_duplicates = false
//!
//! [timeouts]
//! connect = 15
//! rssi = 10
//! discovery = 10
//! scan = 10
//! ```
//!
//! # Environment Variables
//!
//! - `BLUECENTRAL_DEVICE`: Default probe target (overridden by `--device`)
//! - `NO_COLOR`: Disable colored output when set
//! - `RUST_LOG`: Log filter when neither `--verbose` nor `--quiet` is given
//!
//! # Examples
//!
//! ```bash
//! bluecentral scan --duration 5 --service 180d
//! bluecentral probe --device C0:FF:EE:00:00:01 --format json
//! bluecentral probe --simulate
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod format;
pub mod radio;
pub mod style;
pub mod util;

// Re-export core dependencies for convenience
pub use bluecentral_core;
pub use bluecentral_types;
