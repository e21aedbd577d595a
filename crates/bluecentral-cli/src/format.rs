//! Output formatting for scan and probe results.

use std::fmt::Write as _;

use anyhow::Result;
use bluecentral_core::{DisconnectReason, PeripheralEvent, Service};
use bluecentral_types::uuids::short_string;
use serde::Serialize;
use time::OffsetDateTime;

use crate::style;

/// Formatting options shared by all commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
}

impl FormatOptions {
    /// Serialize value to JSON string, respecting compact option.
    pub fn as_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        Ok(json + "\n")
    }
}

// ============================================================================
// Scan results
// ============================================================================

/// A peripheral seen during a scan, merged over all its reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredPeripheral {
    pub id: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub services: Vec<String>,
    pub manufacturer_ids: Vec<u16>,
    pub tx_power_level: Option<i16>,
    /// How many `peripheralDiscover` events it produced.
    pub reports: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub first_seen: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
}

pub fn format_scan_json(peripherals: &[DiscoveredPeripheral], opts: &FormatOptions) -> Result<String> {
    #[derive(Serialize)]
    struct ScanResult<'a> {
        count: usize,
        peripherals: &'a [DiscoveredPeripheral],
    }

    opts.as_json(&ScanResult {
        count: peripherals.len(),
        peripherals,
    })
}

#[must_use]
pub fn format_scan_text(peripherals: &[DiscoveredPeripheral], opts: &FormatOptions) -> String {
    if peripherals.is_empty() {
        return "No peripherals found.\n".to_string();
    }

    let mut output = format!("Found {} peripheral(s)\n\n", peripherals.len());
    let _ = writeln!(
        output,
        "{:<36}  {:<15}  {:<6}  NAME / SERVICES",
        "IDENTIFIER", "SIGNAL", "REPORTS"
    );
    for p in peripherals {
        let services = if p.services.is_empty() {
            String::new()
        } else {
            format!("  [{}]", p.services.join(", "))
        };
        let _ = writeln!(
            output,
            "{:<36}  {}  {:>6}  {}{}",
            p.id,
            style::format_signal_bar(p.rssi, opts.no_color),
            p.reports,
            style::name(p.name.as_deref(), opts.no_color),
            services
        );
    }
    output
}

// ============================================================================
// Probe results
// ============================================================================

/// One event observed while probing, with the time it arrived.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeStep {
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    #[serde(flatten)]
    pub event: PeripheralEvent,
}

/// A discovered service with short-form UUIDs where possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceReport {
    pub uuid: String,
    pub primary: bool,
    pub characteristics: Vec<String>,
}

impl From<&Service> for ServiceReport {
    fn from(service: &Service) -> Self {
        Self {
            uuid: short_string(&service.uuid),
            primary: service.primary,
            characteristics: service.characteristics.iter().map(short_string).collect(),
        }
    }
}

/// Outcome of a connect, RSSI, discovery, disconnect run.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub id: String,
    pub name: Option<String>,
    pub connected: bool,
    pub rssi: Option<i16>,
    pub services: Option<Vec<ServiceReport>>,
    pub disconnect_reason: Option<DisconnectReason>,
    pub steps: Vec<ProbeStep>,
}

impl ProbeReport {
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
            connected: false,
            rssi: None,
            services: None,
            disconnect_reason: None,
            steps: Vec::new(),
        }
    }

    /// Fold one session event into the report.
    pub fn record(&mut self, at: OffsetDateTime, event: PeripheralEvent) {
        match &event {
            PeripheralEvent::Connect => self.connected = true,
            PeripheralEvent::RssiUpdate { rssi } => self.rssi = Some(*rssi),
            PeripheralEvent::ServicesDiscover { services } => {
                self.services = Some(services.iter().map(ServiceReport::from).collect());
            }
            PeripheralEvent::Disconnect { reason } => self.disconnect_reason = Some(reason.clone()),
            _ => {}
        }
        self.steps.push(ProbeStep { at, event });
    }

    /// Whether the session has reached its end: disconnected, or never connected.
    pub fn is_finished(&self) -> bool {
        self.steps.last().is_some_and(|step| {
            matches!(
                step.event,
                PeripheralEvent::Disconnect { .. } | PeripheralEvent::ConnectFailure { .. }
            )
        })
    }
}

pub fn format_probe_json(report: &ProbeReport, opts: &FormatOptions) -> Result<String> {
    opts.as_json(report)
}

fn describe_step(event: &PeripheralEvent) -> (bool, String) {
    match event {
        PeripheralEvent::Connect => (true, "connected".to_string()),
        PeripheralEvent::ConnectFailure { reason } => (false, format!("connect: {}", reason)),
        PeripheralEvent::RssiUpdate { rssi } => (true, format!("RSSI {} dBm", rssi)),
        PeripheralEvent::RssiUpdateFailure { reason } => (false, format!("RSSI: {}", reason)),
        PeripheralEvent::ServicesDiscover { services } => {
            (true, format!("{} service(s) discovered", services.len()))
        }
        PeripheralEvent::ServicesDiscoverFailure { reason } => {
            (false, format!("service discovery: {}", reason))
        }
        PeripheralEvent::Disconnect { reason } => (true, format!("disconnected ({})", reason)),
        other => (true, other.name().to_string()),
    }
}

#[must_use]
pub fn format_probe_text(report: &ProbeReport, opts: &FormatOptions) -> String {
    let mut output = format!(
        "{}  {}\n\n",
        report.id,
        style::name(report.name.as_deref(), opts.no_color)
    );

    for step in &report.steps {
        let (ok, text) = describe_step(&step.event);
        let time = step.at.time();
        let _ = writeln!(
            output,
            "  {:02}:{:02}:{:02}.{:03}  {:<6}  {}",
            time.hour(),
            time.minute(),
            time.second(),
            time.millisecond(),
            style::status_marker(ok, opts.no_color),
            text
        );
    }

    if let Some(services) = &report.services {
        output.push('\n');
        if services.is_empty() {
            output.push_str("No services.\n");
        }
        for service in services {
            let kind = if service.primary { "primary" } else { "secondary" };
            let _ = writeln!(output, "  {} ({})", service.uuid, kind);
            for characteristic in &service.characteristics {
                let _ = writeln!(output, "    - {}", characteristic);
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluecentral_core::ConnectionFailureReason;
    use bluecentral_types::uuids::{BATTERY_LEVEL, BATTERY_SERVICE};
    use time::macros::datetime;

    fn plain() -> FormatOptions {
        FormatOptions {
            no_color: true,
            compact: true,
        }
    }

    fn discovered(id: &str, name: Option<&str>) -> DiscoveredPeripheral {
        let at = datetime!(2026-01-02 03:04:05 UTC);
        DiscoveredPeripheral {
            id: id.to_string(),
            name: name.map(String::from),
            rssi: Some(-65),
            services: vec!["180f".to_string()],
            manufacturer_ids: Vec::new(),
            tx_power_level: None,
            reports: 2,
            first_seen: at,
            last_seen: at,
        }
    }

    #[test]
    fn test_scan_text_empty() {
        assert_eq!(format_scan_text(&[], &plain()), "No peripherals found.\n");
    }

    #[test]
    fn test_scan_text_lists_peripherals() {
        let text = format_scan_text(
            &[discovered("AA:BB", Some("Thermo")), discovered("CC:DD", None)],
            &plain(),
        );
        assert!(text.starts_with("Found 2 peripheral(s)"));
        assert!(text.contains("AA:BB"));
        assert!(text.contains("Thermo  [180f]"));
        assert!(text.contains("(unnamed)"));
    }

    #[test]
    fn test_scan_json_shape() {
        let json = format_scan_json(&[discovered("AA:BB", Some("Thermo"))], &plain()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["peripherals"][0]["id"], "AA:BB");
        assert_eq!(value["peripherals"][0]["rssi"], -65);
        assert_eq!(value["peripherals"][0]["first_seen"], "2026-01-02T03:04:05Z");
    }

    #[test]
    fn test_compact_json_is_single_line() {
        let json = format_scan_json(&[discovered("AA:BB", None)], &plain()).unwrap();
        assert_eq!(json.lines().count(), 1);
    }

    #[test]
    fn test_probe_report_records_steps() {
        let at = datetime!(2026-01-02 03:04:05.250 UTC);
        let mut report = ProbeReport::new("AA:BB", Some("Thermo".to_string()));
        report.record(at, PeripheralEvent::Connect);
        report.record(at, PeripheralEvent::RssiUpdate { rssi: -61 });
        assert!(!report.is_finished());
        report.record(
            at,
            PeripheralEvent::ServicesDiscover {
                services: vec![Service::new(BATTERY_SERVICE).with_characteristic(BATTERY_LEVEL)],
            },
        );
        report.record(
            at,
            PeripheralEvent::Disconnect {
                reason: DisconnectReason::LocalRequest,
            },
        );

        assert!(report.connected);
        assert!(report.is_finished());
        assert_eq!(report.rssi, Some(-61));
        assert_eq!(
            report.services,
            Some(vec![ServiceReport {
                uuid: "180f".to_string(),
                primary: true,
                characteristics: vec!["2a19".to_string()],
            }])
        );

        let text = format_probe_text(&report, &plain());
        assert!(text.contains("03:04:05.250  ok      connected"));
        assert!(text.contains("RSSI -61 dBm"));
        assert!(text.contains("180f (primary)"));
        assert!(text.contains("    - 2a19"));
        assert!(text.contains("disconnected (local request)"));
    }

    #[test]
    fn test_probe_connect_failure_finishes() {
        let mut report = ProbeReport::new("AA:BB", None);
        report.record(
            OffsetDateTime::UNIX_EPOCH,
            PeripheralEvent::ConnectFailure {
                reason: ConnectionFailureReason::OutOfRange,
            },
        );
        assert!(report.is_finished());
        assert!(!report.connected);
        assert!(format_probe_text(&report, &plain()).contains("FAILED"));
    }

    #[test]
    fn test_probe_json_flattens_event_type() {
        let mut report = ProbeReport::new("AA:BB", None);
        report.record(
            datetime!(2026-01-02 03:04:05 UTC),
            PeripheralEvent::RssiUpdate { rssi: -70 },
        );
        let json = format_probe_json(&report, &plain()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["rssi"], -70);
        assert_eq!(value["steps"][0]["type"], "rssiUpdate");
        assert_eq!(value["steps"][0]["rssi"], -70);
        assert_eq!(value["steps"][0]["at"], "2026-01-02T03:04:05Z");
    }
}
