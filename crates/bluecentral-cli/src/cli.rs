//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Which radio to drive
#[derive(Debug, Clone, Args)]
pub struct RadioArgs {
    /// Use a simulated radio with a few scripted peripherals instead of hardware
    #[arg(long)]
    pub simulate: bool,
}

/// Reusable scan arguments
#[derive(Debug, Clone, Args)]
pub struct ScanArgs {
    /// Scan duration in seconds (default from config, else 10)
    #[arg(short = 't', long)]
    pub duration: Option<u64>,

    /// Only report peripherals advertising this service (repeatable or comma-separated)
    #[arg(short, long = "service", value_delimiter = ',')]
    pub services: Vec<String>,

    /// Report every advertisement instead of only changes
    #[arg(long)]
    pub allow_duplicates: bool,
}

/// Reusable output arguments
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Parser)]
#[command(name = "bluecentral")]
#[command(author, version, about = "BLE central session manager", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output compact JSON (no pretty-printing)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for nearby peripherals
    Scan {
        #[command(flatten)]
        scan: ScanArgs,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        radio: RadioArgs,
    },

    /// Connect to a peripheral, read its RSSI, list its services and disconnect
    Probe {
        /// Peripheral address (MAC address or UUID); the first discovery when omitted
        #[arg(short, long, env = "BLUECENTRAL_DEVICE")]
        device: Option<String>,

        /// Give up after this many seconds
        #[arg(short = 'T', long, default_value = "60")]
        timeout: u64,

        /// Only discover these services (repeatable or comma-separated)
        #[arg(long = "discover", value_delimiter = ',')]
        discover: Vec<String>,

        #[command(flatten)]
        scan: ScanArgs,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        radio: RadioArgs,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration subcommands
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init,
}
