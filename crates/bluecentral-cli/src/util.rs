//! Utility functions for CLI operations.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bluecentral_core::events::names;
use bluecentral_core::{AdapterState, Central, CentralEvent, ScanOptions};
use tokio::sync::mpsc::UnboundedSender;

/// Write output to file or stdout.
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

/// Adapter and scan lifecycle, as seen by a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    ScanStarted,
    AdapterUnavailable(AdapterState),
    ScanFailed(String),
}

/// Start scanning whenever the adapter reports `poweredOn`, and forward
/// scan lifecycle changes to `tx`.
///
/// Scanning is started from the `stateChange` handler, so a radio that is
/// switched on later is picked up without polling.
pub fn scan_when_powered(
    central: &Central,
    options: ScanOptions,
    tx: UnboundedSender<Lifecycle>,
) {
    {
        let tx = tx.clone();
        central.on(names::STATE_CHANGE, move |central, event| {
            let CentralEvent::StateChange { state } = event else {
                return;
            };
            if state.is_powered_on() {
                if let Err(e) = central.start_scanning(options.clone()) {
                    let _ = tx.send(Lifecycle::ScanFailed(e.to_string()));
                }
            } else {
                let _ = tx.send(Lifecycle::AdapterUnavailable(*state));
            }
        });
    }
    {
        let tx = tx.clone();
        central.on(names::SCAN_START, move |_, _| {
            let _ = tx.send(Lifecycle::ScanStarted);
        });
    }
    central.on(names::SCAN_FAILURE, move |_, event| {
        if let CentralEvent::ScanFailure { reason } = event {
            let _ = tx.send(Lifecycle::ScanFailed(reason.clone()));
        }
    });
}

/// Format a duration in whole seconds for messages.
pub fn secs(duration: Duration) -> String {
    format!("{}s", duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_output(Some(&path), "{}\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n");
    }

    #[test]
    fn test_write_output_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.json");
        let err = write_output(Some(&path), "x").unwrap_err();
        assert!(err.to_string().contains("Failed to write to"));
    }

    #[test]
    fn test_secs() {
        assert_eq!(secs(Duration::from_millis(10_900)), "10s");
    }
}
