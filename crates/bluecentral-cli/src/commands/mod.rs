//! Command implementations for the CLI.

mod config;
mod probe;
mod scan;

pub use config::cmd_config;
pub use probe::{ProbeArgs, cmd_probe};
pub use scan::{ScanRun, cmd_scan};
