use anyhow::Result;
use bluecentral_cli::cli::{Cli, Commands};
use bluecentral_cli::commands::{ProbeArgs, ScanRun, cmd_config, cmd_probe, cmd_scan};
use bluecentral_cli::config::{Config, parse_uuids, resolve_device};
use bluecentral_cli::format::FormatOptions;
use bluecentral_cli::radio::Radio;
use bluecentral_core::PeripheralId;
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();
    let opts = FormatOptions {
        no_color: cli.no_color,
        compact: cli.compact,
    };

    match cli.command {
        Commands::Scan {
            scan,
            output,
            radio,
        } => {
            let run = ScanRun {
                options: config.scan_options(&scan)?,
                duration: config.scan_duration(&scan),
                format: output.format,
                output: cli.output,
                quiet: cli.quiet,
            };
            let radio = Radio::open(radio.simulate, config.central_config()?).await?;
            cmd_scan(radio, run, &opts).await?;
        }
        Commands::Probe {
            device,
            timeout,
            discover,
            scan,
            output,
            radio,
        } => {
            let args = ProbeArgs {
                target: resolve_device(device, &config).map(PeripheralId::new),
                options: config.scan_options(&scan)?,
                discover: parse_uuids(&discover)?,
                timeout: Duration::from_secs(timeout),
                format: output.format,
                output: cli.output,
                quiet: cli.quiet,
            };
            let radio = Radio::open(radio.simulate, config.central_config()?).await?;
            cmd_probe(radio, args, &opts).await?;
        }
        Commands::Config { action } => cmd_config(action, &config)?,
    }

    Ok(())
}
