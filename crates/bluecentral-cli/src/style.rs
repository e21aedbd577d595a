//! Visual styling utilities for the CLI.

use owo_colors::OwoColorize;

// ============================================================================
// Signal Strength Bar
// ============================================================================

/// Number of cells in the signal bar.
const SIGNAL_BAR_WIDTH: usize = 10;

/// Format RSSI as a visual signal bar.
/// RSSI typically ranges from -100 dBm (weak) to -30 dBm (strong).
pub fn format_signal_bar(rssi: Option<i16>, no_color: bool) -> String {
    let rssi = match rssi {
        Some(r) => r,
        None => return "N/A".to_string(),
    };

    let filled = signal_strength(rssi);
    let bar = format!(
        "{}{}",
        "█".repeat(filled),
        "░".repeat(SIGNAL_BAR_WIDTH - filled)
    );

    if no_color {
        format!("{} {:>4}", bar, rssi)
    } else if filled >= 7 {
        format!("{} {:>4}", bar.green(), rssi)
    } else if filled >= 4 {
        format!("{} {:>4}", bar.yellow(), rssi)
    } else {
        format!("{} {:>4}", bar.red(), rssi)
    }
}

/// Map RSSI onto 0..=10: -100 dBm is 0, -30 dBm and above is 10.
fn signal_strength(rssi: i16) -> usize {
    let clamped = (i32::from(rssi) + 100).clamp(0, 70);
    ((clamped as f32 / 7.0).round() as usize).min(SIGNAL_BAR_WIDTH)
}

// ============================================================================
// Status Markers
// ============================================================================

/// Mark a step as succeeded or failed.
pub fn status_marker(ok: bool, no_color: bool) -> String {
    match (ok, no_color) {
        (true, true) => "ok".to_string(),
        (false, true) => "FAILED".to_string(),
        (true, false) => format!("{}", "ok".green()),
        (false, false) => format!("{}", "FAILED".red().bold()),
    }
}

/// Highlight a peripheral name, or a placeholder when it has none.
pub fn name(name: Option<&str>, no_color: bool) -> String {
    match (name, no_color) {
        (Some(n), true) => n.to_string(),
        (Some(n), false) => format!("{}", n.cyan()),
        (None, true) => "(unnamed)".to_string(),
        (None, false) => format!("{}", "(unnamed)".dimmed()),
    }
}
