//! Scan command implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bluecentral_core::events::names;
use bluecentral_core::{Advertisement, CentralEvent, PeripheralId, ScanOptions};
use bluecentral_types::uuids::short_string;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::OutputFormat;
use crate::format::{DiscoveredPeripheral, FormatOptions, format_scan_json, format_scan_text};
use crate::radio::Radio;
use crate::util::{Lifecycle, scan_when_powered, secs, write_output};

/// What to scan for and how to report it.
#[derive(Debug, Clone)]
pub struct ScanRun {
    pub options: ScanOptions,
    pub duration: Duration,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
    pub quiet: bool,
}

/// One `peripheralDiscover` event.
struct Sighting {
    id: PeripheralId,
    advertisement: Advertisement,
    rssi: Option<i16>,
    at: OffsetDateTime,
}

pub async fn cmd_scan(radio: Radio, run: ScanRun, opts: &FormatOptions) -> Result<()> {
    let peripherals = scan(radio, &run).await?;

    let content = match run.format {
        OutputFormat::Json => format_scan_json(&peripherals, opts)?,
        OutputFormat::Text => format_scan_text(&peripherals, opts),
    };
    write_output(run.output.as_ref(), &content)
}

/// Scan for `run.duration` (or until interrupted) and merge what was seen.
async fn scan(radio: Radio, run: &ScanRun) -> Result<Vec<DiscoveredPeripheral>> {
    let central = radio.central.clone();
    let (lifecycle_tx, mut lifecycle) = mpsc::unbounded_channel();
    let (tx, mut sightings) = mpsc::unbounded_channel();

    scan_when_powered(&central, run.options.clone(), lifecycle_tx);
    central.on(names::PERIPHERAL_DISCOVER, move |_, event| {
        if let CentralEvent::PeripheralDiscover {
            peripheral,
            advertisement,
            rssi,
        } = event
        {
            let _ = tx.send(Sighting {
                id: peripheral.id().clone(),
                advertisement: advertisement.clone(),
                rssi: *rssi,
                at: OffsetDateTime::now_utc(),
            });
        }
    });
    central
        .start()
        .await
        .context("Failed to start session manager")?;

    let deadline = tokio::time::sleep(run.duration);
    tokio::pin!(deadline);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    let mut found = Vec::new();
    let mut started = false;
    let mut failure = None;
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = &mut interrupted => {
                info!("Interrupted, stopping scan");
                break;
            }
            Some(sighting) = sightings.recv() => {
                debug!("Discovered {} (RSSI: {:?})", sighting.id, sighting.rssi);
                merge(&mut found, sighting);
            }
            Some(change) = lifecycle.recv() => match change {
                Lifecycle::ScanStarted => {
                    started = true;
                    if !run.quiet {
                        info!("Scanning for {}...", secs(run.duration));
                    }
                }
                Lifecycle::AdapterUnavailable(state) => {
                    warn!("Bluetooth adapter is {}; waiting for it to power on", state);
                }
                Lifecycle::ScanFailed(reason) => {
                    failure = Some(reason);
                    break;
                }
            },
        }
    }

    let adapter_state = central.state();
    radio.close().await;

    if let Some(reason) = failure {
        bail!("Scan failed: {}", reason);
    }
    if !started {
        bail!("Scan did not start: Bluetooth adapter is {}", adapter_state);
    }
    Ok(found)
}

/// Fold a sighting into the list, keeping first-seen order.
fn merge(found: &mut Vec<DiscoveredPeripheral>, sighting: Sighting) {
    let id = sighting.id.to_string();
    let adv = &sighting.advertisement;
    let services: Vec<String> = adv.service_uuids.iter().map(short_string).collect();
    let mut manufacturer_ids: Vec<u16> = adv.manufacturer_data.keys().copied().collect();
    manufacturer_ids.sort_unstable();

    match found.iter_mut().find(|p| p.id == id) {
        Some(existing) => {
            existing.reports += 1;
            existing.last_seen = sighting.at;
            if sighting.rssi.is_some() {
                existing.rssi = sighting.rssi;
            }
            if adv.local_name.is_some() {
                existing.name = adv.local_name.clone();
            }
            existing.services = services;
            existing.manufacturer_ids = manufacturer_ids;
            existing.tx_power_level = adv.tx_power_level;
        }
        None => found.push(DiscoveredPeripheral {
            id,
            name: adv.local_name.clone(),
            rssi: sighting.rssi,
            services,
            manufacturer_ids,
            tx_power_level: adv.tx_power_level,
            reports: 1,
            first_seen: sighting.at,
            last_seen: sighting.at,
        }),
    }
}
