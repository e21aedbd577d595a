//! Mock transport implementation for testing.
//!
//! This module provides a scriptable radio that can be used for unit testing
//! and simulation without requiring actual BLE hardware.
//!
//! The [`MockTransport`] implements the [`Transport`] trait, allowing it to be
//! used interchangeably with the real radio in a [`Central`](crate::Central).
//!
//! # Features
//!
//! - **Scripted world**: Register peripherals with advertisements, RSSI and services
//! - **Adapter control**: Flip the adapter state and inject advertisements or link loss
//! - **Failure injection**: Fail the next N connects, or every request
//! - **Latency simulation**: Add artificial delays to simulate slow BLE responses
//! - **Request counters**: Assert how often each request reached the radio

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use bluecentral_types::{AdapterState, Advertisement, PeripheralId, Service};

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::events::DisconnectReason;
use crate::scan::ScanOptions;
use crate::transport::{AdvertisementReport, NotificationStream, Transport, TransportEvent};

/// A simulated peripheral known to a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockPeripheral {
    pub id: PeripheralId,
    pub advertisement: Advertisement,
    /// RSSI reported for advertisements and RSSI reads.
    pub rssi: i16,
    pub services: Vec<Service>,
    /// Whether connection attempts succeed.
    pub connectable: bool,
}

impl MockPeripheral {
    /// Create a connectable peripheral with an empty advertisement.
    pub fn new(id: impl Into<PeripheralId>) -> Self {
        Self {
            id: id.into(),
            advertisement: Advertisement::default(),
            rssi: -60,
            services: Vec::new(),
            connectable: true,
        }
    }

    /// Create a peripheral with a random address.
    pub fn random() -> Self {
        Self::new(random_address())
    }

    /// Set the advertisement payload.
    #[must_use]
    pub fn advertisement(mut self, advertisement: Advertisement) -> Self {
        self.advertisement = advertisement;
        self
    }

    /// Set the advertised local name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.advertisement.local_name = Some(name.into());
        self
    }

    /// Set the RSSI.
    #[must_use]
    pub fn rssi(mut self, rssi: i16) -> Self {
        self.rssi = rssi;
        self
    }

    /// Add a GATT service.
    #[must_use]
    pub fn service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    /// Make connection attempts fail with [`ConnectionFailureReason::Rejected`].
    #[must_use]
    pub fn non_connectable(mut self) -> Self {
        self.connectable = false;
        self
    }
}

/// Generate a random static-looking Bluetooth address.
pub fn random_address() -> PeripheralId {
    let bytes: [u8; 6] = rand::random();
    let text = bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":");
    PeripheralId::new(text)
}

/// A scriptable radio for testing.
///
/// Implements [`Transport`] for use in a [`Central`](crate::Central).
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use bluecentral_core::{Central, CentralConfig, MockPeripheral, MockTransport};
///
/// #[tokio::main]
/// async fn main() {
///     let transport = Arc::new(MockTransport::new());
///     transport.add_peripheral(MockPeripheral::new("AA:BB:CC:DD:EE:01").name("Thermo"));
///
///     let central = Central::new(Arc::clone(&transport), CentralConfig::default()).unwrap();
///     central.start().await.unwrap();
///     central.shutdown().await;
/// }
/// ```
pub struct MockTransport {
    state: Mutex<AdapterState>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    peripherals: Mutex<HashMap<PeripheralId, MockPeripheral>>,
    connected: Mutex<HashSet<PeripheralId>>,
    scanning: AtomicBool,
    last_scan: Mutex<Option<ScanOptions>>,
    should_fail: AtomicBool,
    fail_message: Mutex<String>,
    /// Number of connects to fail before succeeding again.
    remaining_connect_failures: AtomicU32,
    /// Simulated latency for every request except connect, in milliseconds.
    latency_ms: AtomicU64,
    /// Simulated connect latency in milliseconds (0 = no delay).
    connect_latency_ms: AtomicU64,
    scan_start_count: AtomicU32,
    scan_stop_count: AtomicU32,
    connect_count: AtomicU32,
    disconnect_count: AtomicU32,
    rssi_read_count: AtomicU32,
    discovery_count: AtomicU32,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("state", &self.adapter_state_now())
            .field("scanning", &self.scanning.load(Ordering::Relaxed))
            .field("peripherals", &lock(&self.peripherals).len())
            .field("connected", &lock(&self.connected).len())
            .finish_non_exhaustive()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("mock transport lock poisoned")
}

impl MockTransport {
    /// Create a powered-on radio with no peripherals.
    pub fn new() -> Self {
        Self::with_state(AdapterState::PoweredOn)
    }

    /// Create a radio that reports `state` initially.
    pub fn with_state(state: AdapterState) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(state),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            peripherals: Mutex::new(HashMap::new()),
            connected: Mutex::new(HashSet::new()),
            scanning: AtomicBool::new(false),
            last_scan: Mutex::new(None),
            should_fail: AtomicBool::new(false),
            fail_message: Mutex::new("Mock failure".to_string()),
            remaining_connect_failures: AtomicU32::new(0),
            latency_ms: AtomicU64::new(0),
            connect_latency_ms: AtomicU64::new(0),
            scan_start_count: AtomicU32::new(0),
            scan_stop_count: AtomicU32::new(0),
            connect_count: AtomicU32::new(0),
            disconnect_count: AtomicU32::new(0),
            rssi_read_count: AtomicU32::new(0),
            discovery_count: AtomicU32::new(0),
        }
    }

    fn adapter_state_now(&self) -> AdapterState {
        *lock(&self.state)
    }

    fn notify(&self, event: TransportEvent) {
        // No subscriber yet, or the subscriber has gone away.
        let _ = self.events_tx.send(event);
    }

    // --- World scripting ---

    /// Change the adapter state and notify subscribers. Losing power drops
    /// every link and the scan without further notifications.
    pub fn set_state(&self, state: AdapterState) {
        *lock(&self.state) = state;
        if !state.is_powered_on() {
            lock(&self.connected).clear();
            self.scanning.store(false, Ordering::SeqCst);
        }
        self.notify(TransportEvent::StateChange(state));
    }

    /// Register a peripheral, replacing any with the same identity.
    pub fn add_peripheral(&self, peripheral: MockPeripheral) {
        lock(&self.peripherals).insert(peripheral.id.clone(), peripheral);
    }

    /// Forget a peripheral. An open link to it is dropped silently.
    pub fn remove_peripheral(&self, id: &PeripheralId) {
        lock(&self.peripherals).remove(id);
        lock(&self.connected).remove(id);
    }

    /// Broadcast the stored advertisement of `id`.
    ///
    /// Returns `false` (and sends nothing) when the peripheral is unknown or
    /// the radio is not scanning, as a real radio would hear nothing.
    pub fn advertise(&self, id: &PeripheralId) -> bool {
        let report = {
            let peripherals = lock(&self.peripherals);
            let Some(peripheral) = peripherals.get(id) else {
                return false;
            };
            AdvertisementReport {
                id: peripheral.id.clone(),
                advertisement: peripheral.advertisement.clone(),
                rssi: Some(peripheral.rssi),
            }
        };
        self.inject_advertisement(report)
    }

    /// Broadcast the stored advertisement of every registered peripheral.
    /// Returns how many were sent.
    pub fn advertise_all(&self) -> usize {
        let ids: Vec<PeripheralId> = lock(&self.peripherals).keys().cloned().collect();
        ids.iter().filter(|id| self.advertise(id)).count()
    }

    /// Deliver an arbitrary advertisement report while scanning.
    pub fn inject_advertisement(&self, report: AdvertisementReport) -> bool {
        if !self.is_scanning() {
            return false;
        }
        self.notify(TransportEvent::Advertisement(report));
        true
    }

    /// Change the advertisement a peripheral broadcasts.
    pub fn set_advertisement(&self, id: &PeripheralId, advertisement: Advertisement) {
        if let Some(p) = lock(&self.peripherals).get_mut(id) {
            p.advertisement = advertisement;
        }
    }

    /// Change the RSSI a peripheral reports.
    pub fn set_rssi(&self, id: &PeripheralId, rssi: i16) {
        if let Some(p) = lock(&self.peripherals).get_mut(id) {
            p.rssi = rssi;
        }
    }

    /// Change the services a peripheral exposes.
    pub fn set_services(&self, id: &PeripheralId, services: Vec<Service>) {
        if let Some(p) = lock(&self.peripherals).get_mut(id) {
            p.services = services;
        }
    }

    /// Drop a link from the radio side and report it.
    pub fn drop_connection(&self, id: &PeripheralId, reason: DisconnectReason) {
        lock(&self.connected).remove(id);
        self.notify(TransportEvent::Disconnected {
            id: id.clone(),
            reason,
        });
    }

    // --- Failure injection ---

    /// Make every request fail with a transport error.
    pub fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        self.should_fail.store(fail, Ordering::Relaxed);
        if let Some(msg) = message {
            *lock(&self.fail_message) = msg.to_string();
        }
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.remaining_connect_failures
            .store(count, Ordering::Relaxed);
    }

    /// Delay every request except connect.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Delay connection attempts.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    // --- Inspection ---

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Options of the most recent successful scan start.
    pub fn last_scan_options(&self) -> Option<ScanOptions> {
        lock(&self.last_scan).clone()
    }

    pub fn is_connected(&self, id: &PeripheralId) -> bool {
        lock(&self.connected).contains(id)
    }

    pub fn scan_start_count(&self) -> u32 {
        self.scan_start_count.load(Ordering::Relaxed)
    }

    pub fn scan_stop_count(&self) -> u32 {
        self.scan_stop_count.load(Ordering::Relaxed)
    }

    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::Relaxed)
    }

    pub fn disconnect_count(&self) -> u32 {
        self.disconnect_count.load(Ordering::Relaxed)
    }

    pub fn rssi_read_count(&self) -> u32 {
        self.rssi_read_count.load(Ordering::Relaxed)
    }

    pub fn discovery_count(&self) -> u32 {
        self.discovery_count.load(Ordering::Relaxed)
    }

    // --- Helpers ---

    async fn simulate_latency(latency_ms: &AtomicU64) {
        let ms = latency_ms.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn check_should_fail(&self) -> Result<()> {
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::transport(lock(&self.fail_message).clone()));
        }
        Ok(())
    }

    fn check_powered_on(&self) -> Result<()> {
        let state = self.adapter_state_now();
        if state.is_powered_on() {
            Ok(())
        } else {
            Err(Error::transport(format!("adapter is {}", state)))
        }
    }

    fn check_connected(&self, id: &PeripheralId) -> Result<()> {
        if self.is_connected(id) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn adapter_state(&self) -> Result<AdapterState> {
        Ok(self.adapter_state_now())
    }

    async fn notifications(&self) -> Result<NotificationStream> {
        let rx = lock(&self.events_rx)
            .take()
            .ok_or_else(|| Error::invalid_state("subscribe", "already subscribed"))?;
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(stream.boxed())
    }

    async fn start_scan(&self, options: &ScanOptions) -> Result<()> {
        Self::simulate_latency(&self.latency_ms).await;
        self.scan_start_count.fetch_add(1, Ordering::Relaxed);
        self.check_powered_on()?;
        self.check_should_fail()?;
        *lock(&self.last_scan) = Some(options.clone());
        self.scanning.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        Self::simulate_latency(&self.latency_ms).await;
        self.scan_stop_count.fetch_add(1, Ordering::Relaxed);
        self.scanning.store(false, Ordering::SeqCst);
        self.check_should_fail()
    }

    async fn connect(&self, id: &PeripheralId) -> Result<()> {
        Self::simulate_latency(&self.connect_latency_ms).await;
        self.connect_count.fetch_add(1, Ordering::Relaxed);

        if !self.adapter_state_now().is_powered_on() {
            return Err(Error::connection_failed(
                Some(id.to_string()),
                ConnectionFailureReason::AdapterUnavailable,
            ));
        }
        let injected = self
            .remaining_connect_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(Error::connection_failed(
                Some(id.to_string()),
                ConnectionFailureReason::Other(lock(&self.fail_message).clone()),
            ));
        }
        self.check_should_fail()?;

        let connectable = match lock(&self.peripherals).get(id) {
            Some(p) => p.connectable,
            None => {
                return Err(Error::connection_failed(
                    Some(id.to_string()),
                    ConnectionFailureReason::OutOfRange,
                ));
            }
        };
        if !connectable {
            return Err(Error::connection_failed(
                Some(id.to_string()),
                ConnectionFailureReason::Rejected,
            ));
        }
        lock(&self.connected).insert(id.clone());
        Ok(())
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<bool> {
        Self::simulate_latency(&self.latency_ms).await;
        self.disconnect_count.fetch_add(1, Ordering::Relaxed);
        let was_connected = lock(&self.connected).remove(id);
        if was_connected {
            // Real stacks confirm a local disconnect with a notification too.
            self.notify(TransportEvent::Disconnected {
                id: id.clone(),
                reason: DisconnectReason::LocalRequest,
            });
        }
        Ok(was_connected)
    }

    async fn read_rssi(&self, id: &PeripheralId) -> Result<i16> {
        Self::simulate_latency(&self.latency_ms).await;
        self.rssi_read_count.fetch_add(1, Ordering::Relaxed);
        self.check_should_fail()?;
        self.check_connected(id)?;
        lock(&self.peripherals)
            .get(id)
            .map(|p| p.rssi)
            .ok_or_else(|| Error::PeripheralNotFound(id.to_string()))
    }

    async fn discover_services(&self, id: &PeripheralId, _filter: &[Uuid]) -> Result<Vec<Service>> {
        Self::simulate_latency(&self.latency_ms).await;
        self.discovery_count.fetch_add(1, Ordering::Relaxed);
        self.check_should_fail()?;
        self.check_connected(id)?;
        lock(&self.peripherals)
            .get(id)
            .map(|p| p.services.clone())
            .ok_or_else(|| Error::PeripheralNotFound(id.to_string()))
    }
}
