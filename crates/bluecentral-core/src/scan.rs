//! Scan lifecycle and discovery de-duplication.
//!
//! [`ScanController`] is the synchronous half of scanning: it tracks whether
//! a scan is idle, starting, active or stopping, stamps every start/stop
//! request with a generation so late confirmations can be recognised, and
//! decides whether an advertisement becomes a `peripheralDiscover` event.
//! The asynchronous half (issuing transport requests and emitting events)
//! lives in [`Central`](crate::Central).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use bluecentral_types::{Advertisement, PeripheralId};

/// Options for a scan session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Only surface peripherals advertising at least one of these services.
    /// Empty means no filter.
    #[serde(default)]
    pub service_uuids: Vec<Uuid>,
    /// Surface every advertisement packet instead of one per identity.
    #[serde(default)]
    pub allow_duplicates: bool,
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service UUID to the filter.
    #[must_use]
    pub fn service(mut self, uuid: Uuid) -> Self {
        self.service_uuids.push(uuid);
        self
    }

    /// Replace the service filter.
    #[must_use]
    pub fn services(mut self, uuids: impl IntoIterator<Item = Uuid>) -> Self {
        self.service_uuids = uuids.into_iter().collect();
        self
    }

    /// Set whether every advertisement packet is surfaced.
    #[must_use]
    pub fn allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }
}

/// Where the scan lifecycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Idle,
    /// Start requested, waiting for the transport.
    Starting,
    Active,
    /// Stop requested, waiting for the transport.
    Stopping,
}

/// What to do with an incoming advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanVerdict {
    /// No active scan, or the service filter does not match.
    Ignore,
    /// Already reported in this scan session with the same payload.
    Duplicate,
    /// Emit `peripheralDiscover`.
    Report,
}

/// Scan state, request generations and the per-session dedup memory.
#[derive(Debug, Default)]
pub struct ScanController {
    state: ScanState,
    generation: u64,
    options: ScanOptions,
    reported: HashMap<PeripheralId, Advertisement>,
}

impl ScanController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ScanState::Active
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Begin a new scan session, replacing any current one. Returns the
    /// generation the start confirmation must carry.
    pub fn begin_start(&mut self, options: ScanOptions) -> u64 {
        self.generation += 1;
        self.state = ScanState::Starting;
        self.options = options;
        self.reported.clear();
        self.generation
    }

    /// Apply a start confirmation. Returns `false` for a stale confirmation,
    /// which must be ignored.
    pub fn complete_start(&mut self, generation: u64, succeeded: bool) -> bool {
        if generation != self.generation || self.state != ScanState::Starting {
            debug!("Ignoring stale scan start confirmation ({} != {})", generation, self.generation);
            return false;
        }
        self.state = if succeeded {
            ScanState::Active
        } else {
            ScanState::Idle
        };
        true
    }

    /// Begin stopping. Returns `None` when there is nothing to stop.
    pub fn begin_stop(&mut self) -> Option<u64> {
        match self.state {
            ScanState::Idle | ScanState::Stopping => None,
            ScanState::Starting | ScanState::Active => {
                self.generation += 1;
                self.state = ScanState::Stopping;
                Some(self.generation)
            }
        }
    }

    /// Apply a stop confirmation. Returns `false` for a stale confirmation.
    pub fn complete_stop(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.state != ScanState::Stopping {
            debug!("Ignoring stale scan stop confirmation ({} != {})", generation, self.generation);
            return false;
        }
        self.state = ScanState::Idle;
        self.reported.clear();
        true
    }

    /// Drop the scan without asking the transport (adapter lost power).
    /// Returns `true` if a `scanStop` is owed to subscribers.
    pub fn reset(&mut self) -> bool {
        let owed = matches!(self.state, ScanState::Active | ScanState::Stopping);
        self.generation += 1;
        self.state = ScanState::Idle;
        self.reported.clear();
        owed
    }

    /// Forget the dedup entry for one peripheral.
    pub fn forget(&mut self, id: &PeripheralId) {
        self.reported.remove(id);
    }

    /// Decide whether `advertisement` from `id` is surfaced, recording it
    /// when it is.
    pub fn should_report(&mut self, id: &PeripheralId, advertisement: &Advertisement) -> ScanVerdict {
        if self.state != ScanState::Active {
            return ScanVerdict::Ignore;
        }
        if !advertisement.advertises_any(&self.options.service_uuids) {
            return ScanVerdict::Ignore;
        }
        if self.options.allow_duplicates {
            return ScanVerdict::Report;
        }
        match self.reported.get(id) {
            Some(previous) if previous == advertisement => ScanVerdict::Duplicate,
            _ => {
                self.reported.insert(id.clone(), advertisement.clone());
                ScanVerdict::Report
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluecentral_types::uuids::{BATTERY_SERVICE, HEART_RATE_SERVICE};

    fn active(options: ScanOptions) -> ScanController {
        let mut controller = ScanController::new();
        let generation = controller.begin_start(options);
        assert!(controller.complete_start(generation, true));
        controller
    }

    #[test]
    fn test_scan_options_builder() {
        let options = ScanOptions::new()
            .service(BATTERY_SERVICE)
            .allow_duplicates(true);
        assert_eq!(options.service_uuids, vec![BATTERY_SERVICE]);
        assert!(options.allow_duplicates);

        let options = options.services([HEART_RATE_SERVICE]);
        assert_eq!(options.service_uuids, vec![HEART_RATE_SERVICE]);
    }

    #[test]
    fn test_ignored_while_idle() {
        let mut controller = ScanController::new();
        let id = PeripheralId::new("AA:BB");
        assert_eq!(
            controller.should_report(&id, &Advertisement::new()),
            ScanVerdict::Ignore
        );
    }

    #[test]
    fn test_ignored_while_starting() {
        let mut controller = ScanController::new();
        controller.begin_start(ScanOptions::default());
        let id = PeripheralId::new("AA:BB");
        assert_eq!(
            controller.should_report(&id, &Advertisement::new()),
            ScanVerdict::Ignore
        );
    }

    #[test]
    fn test_dedup_same_payload() {
        let mut controller = active(ScanOptions::default());
        let id = PeripheralId::new("AA:BB");
        let adv = Advertisement::new().with_local_name("Thermo");

        assert_eq!(controller.should_report(&id, &adv), ScanVerdict::Report);
        assert_eq!(controller.should_report(&id, &adv), ScanVerdict::Duplicate);
        assert_eq!(controller.should_report(&id, &adv), ScanVerdict::Duplicate);
    }

    #[test]
    fn test_changed_payload_is_reported() {
        let mut controller = active(ScanOptions::default());
        let id = PeripheralId::new("AA:BB");
        let adv = Advertisement::new().with_local_name("Thermo");
        let changed = adv.clone().with_manufacturer_data(0x0702, vec![1]);

        assert_eq!(controller.should_report(&id, &adv), ScanVerdict::Report);
        assert_eq!(controller.should_report(&id, &changed), ScanVerdict::Report);
        assert_eq!(controller.should_report(&id, &changed), ScanVerdict::Duplicate);
    }

    #[test]
    fn test_allow_duplicates_reports_everything() {
        let mut controller = active(ScanOptions::new().allow_duplicates(true));
        let id = PeripheralId::new("AA:BB");
        let adv = Advertisement::new();
        for _ in 0..3 {
            assert_eq!(controller.should_report(&id, &adv), ScanVerdict::Report);
        }
    }

    #[test]
    fn test_service_filter() {
        let mut controller = active(ScanOptions::new().service(BATTERY_SERVICE));
        let id = PeripheralId::new("AA:BB");
        let other = Advertisement::new().with_service(HEART_RATE_SERVICE);
        let battery = Advertisement::new().with_service(BATTERY_SERVICE);

        assert_eq!(controller.should_report(&id, &other), ScanVerdict::Ignore);
        assert_eq!(controller.should_report(&id, &battery), ScanVerdict::Report);
    }

    #[test]
    fn test_restart_clears_dedup_memory() {
        let mut controller = active(ScanOptions::default());
        let id = PeripheralId::new("AA:BB");
        let adv = Advertisement::new();
        assert_eq!(controller.should_report(&id, &adv), ScanVerdict::Report);

        let generation = controller.begin_start(ScanOptions::default());
        controller.complete_start(generation, true);
        assert_eq!(controller.should_report(&id, &adv), ScanVerdict::Report);
    }

    #[test]
    fn test_forget_allows_rediscovery() {
        let mut controller = active(ScanOptions::default());
        let id = PeripheralId::new("AA:BB");
        let adv = Advertisement::new();
        controller.should_report(&id, &adv);
        controller.forget(&id);
        assert_eq!(controller.should_report(&id, &adv), ScanVerdict::Report);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut controller = ScanController::new();
        assert_eq!(controller.begin_stop(), None);

        let mut controller = active(ScanOptions::default());
        let generation = controller.begin_stop().unwrap();
        assert_eq!(controller.begin_stop(), None);
        assert!(controller.complete_stop(generation));
        assert_eq!(controller.state(), ScanState::Idle);
    }

    #[test]
    fn test_stop_before_start_confirmation_makes_start_stale() {
        let mut controller = ScanController::new();
        let start = controller.begin_start(ScanOptions::default());
        let stop = controller.begin_stop().unwrap();
        assert!(!controller.complete_start(start, true));
        assert_eq!(controller.state(), ScanState::Stopping);
        assert!(controller.complete_stop(stop));
        assert!(!controller.is_active());
    }

    #[test]
    fn test_failed_start_returns_to_idle() {
        let mut controller = ScanController::new();
        let generation = controller.begin_start(ScanOptions::default());
        assert!(controller.complete_start(generation, false));
        assert_eq!(controller.state(), ScanState::Idle);
    }

    #[test]
    fn test_reset() {
        let mut controller = ScanController::new();
        assert!(!controller.reset());

        let start = controller.begin_start(ScanOptions::default());
        assert!(!controller.reset());
        assert!(!controller.complete_start(start, true));

        let mut controller = active(ScanOptions::default());
        assert!(controller.reset());
        assert_eq!(controller.state(), ScanState::Idle);
    }
}
