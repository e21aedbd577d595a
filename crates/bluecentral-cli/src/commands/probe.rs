//! Probe command implementation.
//!
//! Scans until the target (or any peripheral) shows up, stops scanning, then
//! walks one session through connect, RSSI, service discovery and
//! disconnect. Each step is issued from the handler of the previous one.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use bluecentral_core::events::names;
use bluecentral_core::{CentralEvent, Peripheral, PeripheralEvent, PeripheralId, ScanOptions};
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, ProbeReport, format_probe_json, format_probe_text};
use crate::radio::Radio;
use crate::util::{Lifecycle, scan_when_powered, secs, write_output};

/// Session events a probe follows.
const FOLLOWED: [&str; 7] = [
    names::CONNECT,
    names::CONNECT_FAILURE,
    names::RSSI_UPDATE,
    names::RSSI_UPDATE_FAILURE,
    names::SERVICES_DISCOVER,
    names::SERVICES_DISCOVER_FAILURE,
    names::DISCONNECT,
];

/// Arguments for the probe command.
#[derive(Debug, Clone)]
pub struct ProbeArgs {
    /// Peripheral to probe; the first one discovered when `None`.
    pub target: Option<PeripheralId>,
    pub options: ScanOptions,
    /// Services to discover; all of them when empty.
    pub discover: Vec<Uuid>,
    pub timeout: Duration,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
    pub quiet: bool,
}

enum ProbeUpdate {
    Selected { id: PeripheralId, name: Option<String> },
    Event(OffsetDateTime, PeripheralEvent),
    Failed(String),
}

pub async fn cmd_probe(radio: Radio, args: ProbeArgs, opts: &FormatOptions) -> Result<()> {
    let report = probe(radio, &args).await?;

    let content = match args.format {
        OutputFormat::Json => format_probe_json(&report, opts)?,
        OutputFormat::Text => format_probe_text(&report, opts),
    };
    write_output(args.output.as_ref(), &content)?;

    if !report.connected {
        bail!("Could not connect to {}", report.id);
    }
    Ok(())
}

async fn probe(radio: Radio, args: &ProbeArgs) -> Result<ProbeReport> {
    let central = radio.central.clone();
    let (lifecycle_tx, mut lifecycle) = mpsc::unbounded_channel();
    let (tx, mut updates) = mpsc::unbounded_channel();

    scan_when_powered(&central, args.options.clone(), lifecycle_tx);

    let claimed = Arc::new(AtomicBool::new(false));
    let target = args.target.clone();
    let discover = args.discover.clone();
    central.on(names::PERIPHERAL_DISCOVER, move |central, event| {
        let CentralEvent::PeripheralDiscover { peripheral, .. } = event else {
            return;
        };
        if target.as_ref().is_some_and(|t| t != peripheral.id()) {
            return;
        }
        if claimed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = central.stop_scanning() {
            warn!("Failed to stop scan: {}", e);
        }
        let _ = tx.send(ProbeUpdate::Selected {
            id: peripheral.id().clone(),
            name: peripheral.local_name(),
        });
        follow(peripheral, &discover, &tx);
        if let Err(e) = peripheral.connect() {
            let _ = tx.send(ProbeUpdate::Failed(e.to_string()));
        }
    });
    central
        .start()
        .await
        .context("Failed to start session manager")?;

    let deadline = tokio::time::sleep(args.timeout);
    tokio::pin!(deadline);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    let mut report: Option<ProbeReport> = None;
    let outcome = loop {
        tokio::select! {
            _ = &mut deadline => {
                break Err(anyhow!("Probe timed out after {}", secs(args.timeout)));
            }
            _ = &mut interrupted => break Err(anyhow!("Interrupted")),
            Some(update) = updates.recv() => match update {
                ProbeUpdate::Selected { id, name } => {
                    if !args.quiet {
                        info!("Probing {}", id);
                    }
                    report = Some(ProbeReport::new(id.to_string(), name));
                }
                ProbeUpdate::Event(at, event) => {
                    if let Some(report) = report.as_mut() {
                        report.record(at, event);
                        if report.is_finished() {
                            break Ok(());
                        }
                    }
                }
                ProbeUpdate::Failed(reason) => break Err(anyhow!("Probe failed: {}", reason)),
            },
            Some(change) = lifecycle.recv() => match change {
                Lifecycle::ScanStarted => {
                    if !args.quiet && report.is_none() {
                        match &args.target {
                            Some(id) => info!("Scanning for {}...", id),
                            None => info!("Scanning for the first peripheral..."),
                        }
                    }
                }
                Lifecycle::AdapterUnavailable(state) => {
                    warn!("Bluetooth adapter is {}; waiting for it to power on", state);
                }
                Lifecycle::ScanFailed(reason) => break Err(anyhow!("Scan failed: {}", reason)),
            },
        }
    };

    radio.close().await;
    outcome?;
    report.ok_or_else(|| anyhow!("No peripheral was probed"))
}

/// Forward the peripheral's session events and chain the next step from
/// each handler.
fn follow(peripheral: &Peripheral, discover: &[Uuid], tx: &UnboundedSender<ProbeUpdate>) {
    for name in FOLLOWED {
        let tx = tx.clone();
        let discover = discover.to_vec();
        peripheral.on(name, move |peripheral, event| {
            let _ = tx.send(ProbeUpdate::Event(OffsetDateTime::now_utc(), event.clone()));
            if let Err(e) = next_step(peripheral, event, &discover) {
                let _ = tx.send(ProbeUpdate::Failed(e.to_string()));
            }
        });
    }
}

/// Issue the request that follows `event`. A failed RSSI read or discovery
/// does not stop the probe.
fn next_step(
    peripheral: &Peripheral,
    event: &PeripheralEvent,
    discover: &[Uuid],
) -> bluecentral_core::Result<()> {
    match event {
        PeripheralEvent::Connect => peripheral.update_rssi(),
        PeripheralEvent::RssiUpdate { .. } | PeripheralEvent::RssiUpdateFailure { .. } => {
            peripheral.discover_services(discover)
        }
        PeripheralEvent::ServicesDiscover { .. }
        | PeripheralEvent::ServicesDiscoverFailure { .. } => peripheral.disconnect(),
        _ => Ok(()),
    }
}
