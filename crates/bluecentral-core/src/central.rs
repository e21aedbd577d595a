//! The BLE central session manager.
//!
//! A [`Central`] owns the adapter state machine, the scan controller and the
//! table of discovered peripherals. A single driver task consumes one queue
//! fed by the transport's notifications and by the completions of spawned
//! transport requests, and emits every event from that task in order.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bluecentral_core::events::{names, CentralEvent};
//! use bluecentral_core::{BtleplugTransport, Central, CentralConfig, ScanOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(BtleplugTransport::new().await?);
//!     let central = Central::new(transport, CentralConfig::default())?;
//!
//!     central.on(names::STATE_CHANGE, |central, event| {
//!         if let CentralEvent::StateChange { state } = event {
//!             if state.is_powered_on() {
//!                 let _ = central.start_scanning(ScanOptions::default());
//!             }
//!         }
//!     });
//!     central.on(names::PERIPHERAL_DISCOVER, |_, event| {
//!         if let CentralEvent::PeripheralDiscover { peripheral, rssi, .. } = event {
//!             println!("{} ({:?} dBm)", peripheral.id(), rssi);
//!         }
//!     });
//!
//!     central.start().await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     central.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock, Weak};

use futures::StreamExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bluecentral_types::{AdapterState, Advertisement, PeripheralId, Service};

use crate::adapter::AdapterStateMachine;
use crate::config::CentralConfig;
use crate::error::{Error, Result};
use crate::events::{CentralEvent, DisconnectReason, EventEmitter, ListenerId, PeripheralEvent};
use crate::peripheral::Peripheral;
use crate::scan::{ScanController, ScanOptions, ScanState, ScanVerdict};
use crate::transport::{AdvertisementReport, NotificationStream, Transport, TransportEvent};
use crate::util::with_timeout;

/// Everything the driver task consumes, in arrival order.
pub(crate) enum Notification {
    Transport(TransportEvent),
    ScanStarted {
        generation: u64,
        options: ScanOptions,
        result: Result<()>,
    },
    ScanStopped {
        generation: u64,
        result: Result<()>,
    },
    Connected {
        peripheral: Peripheral,
        generation: u64,
        result: Result<()>,
    },
    RssiRead {
        peripheral: Peripheral,
        generation: u64,
        result: Result<i16>,
    },
    ServicesDiscovered {
        peripheral: Peripheral,
        generation: u64,
        filter: Vec<Uuid>,
        result: Result<Vec<Service>>,
    },
    /// A peripheral event produced synchronously by a request call.
    Deferred {
        peripheral: Peripheral,
        event: PeripheralEvent,
    },
    /// A local teardown finished without dropping a live link, so no
    /// transport disconnect will confirm it.
    LinkReleased { id: PeripheralId },
}

pub(crate) type QueueSender = mpsc::UnboundedSender<Notification>;

/// Transport-side bookkeeping for one identity. Outlives the [`Peripheral`]
/// handle, so a removed and rediscovered peripheral shares it.
#[derive(Default)]
struct Link {
    /// Last connect/disconnect request, so they reach the transport in
    /// issue order.
    chain: Option<JoinHandle<()>>,
    /// Local teardowns whose transport confirmation has not been seen.
    releases: u32,
}

/// State shared by the [`Central`] handles, the driver and the peripherals.
///
/// Lock order: `adapter` → `scan` → `peripherals` → a peripheral's session.
/// `links` is taken last, with no other lock held.
pub(crate) struct Shared {
    config: CentralConfig,
    transport: Arc<dyn Transport>,
    adapter: Mutex<AdapterStateMachine>,
    scan: Mutex<ScanController>,
    peripherals: RwLock<HashMap<PeripheralId, Peripheral>>,
    events: EventEmitter<Central, CentralEvent>,
    queue_tx: QueueSender,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<Notification>>>,
    runtime: OnceLock<Handle>,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
    /// Last scan start/stop request, so they reach the transport in order.
    scan_chain: Mutex<Option<JoinHandle<()>>>,
    links: Mutex<HashMap<PeripheralId, Link>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Shared {
    pub(crate) fn adapter(&self) -> MutexGuard<'_, AdapterStateMachine> {
        self.adapter.lock().expect("adapter lock poisoned")
    }

    fn scan(&self) -> MutexGuard<'_, ScanController> {
        self.scan.lock().expect("scan lock poisoned")
    }

    pub(crate) fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub(crate) fn config(&self) -> &CentralConfig {
        &self.config
    }

    pub(crate) fn queue(&self) -> QueueSender {
        self.queue_tx.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    fn spawn<F>(&self, future: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.runtime.get() {
            Some(runtime) => Some(runtime.spawn(future)),
            None => {
                warn!("Request issued before the session manager was started; dropped");
                None
            }
        }
    }

    /// Queue a notification for the driver.
    pub(crate) fn post(&self, notification: Notification) {
        // The driver is gone after shutdown; nothing left to deliver to.
        let _ = self.queue_tx.send(notification);
    }

    /// Run a transport request and queue its completion.
    pub(crate) fn dispatch<F>(&self, request: F)
    where
        F: Future<Output = Notification> + Send + 'static,
    {
        let queue = self.queue();
        self.spawn(async move {
            let _ = queue.send(request.await);
        });
    }

    /// Run `future` after the request previously stored in `slot`.
    fn chain<F>(&self, slot: &mut Option<JoinHandle<()>>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let previous = slot.take();
        *slot = self.spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            future.await;
        });
    }

    /// Run a scan start/stop request after the previous one.
    fn chain_scan<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.scan_chain.lock().expect("scan chain lock poisoned");
        self.chain(&mut *slot, future);
    }

    fn links(&self) -> MutexGuard<'_, HashMap<PeripheralId, Link>> {
        self.links.lock().expect("link table lock poisoned")
    }

    /// Run a connect/disconnect request for `id` after the previous one.
    pub(crate) fn chain_link<F>(&self, id: &PeripheralId, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut links = self.links();
        let link = links.entry(id.clone()).or_default();
        self.chain(&mut link.chain, future);
    }

    /// Note a local teardown of `id`; its transport confirmation is consumed
    /// by [`settle_release`](Self::settle_release).
    pub(crate) fn expect_release(&self, id: &PeripheralId) {
        self.links().entry(id.clone()).or_default().releases += 1;
    }

    /// Consume one pending local teardown of `id`. Returns `false` when none
    /// was pending.
    fn settle_release(&self, id: &PeripheralId) -> bool {
        match self.links().get_mut(id) {
            Some(link) if link.releases > 0 => {
                link.releases -= 1;
                true
            }
            _ => false,
        }
    }

    fn peripheral(&self, id: &PeripheralId) -> Option<Peripheral> {
        self.peripherals
            .read()
            .expect("peripheral table lock poisoned")
            .get(id)
            .cloned()
    }

    fn upsert(self: &Arc<Self>, id: &PeripheralId, advertisement: &Advertisement) -> Peripheral {
        let mut table = self
            .peripherals
            .write()
            .expect("peripheral table lock poisoned");
        match table.get(id) {
            Some(existing) => {
                existing.update_advertisement(advertisement.clone());
                existing.clone()
            }
            None => {
                debug!("New peripheral {}", id);
                let peripheral =
                    Peripheral::new(id.clone(), advertisement.clone(), Arc::downgrade(self));
                table.insert(id.clone(), peripheral.clone());
                peripheral
            }
        }
    }

    fn handle(self: &Arc<Self>, notification: Notification) {
        let central = Central {
            shared: Arc::clone(self),
        };
        match notification {
            Notification::Transport(TransportEvent::StateChange(state)) => {
                self.on_state_change(&central, state);
            }
            Notification::Transport(TransportEvent::Advertisement(report)) => {
                self.on_advertisement(&central, report);
            }
            Notification::Transport(TransportEvent::Disconnected { id, reason }) => {
                if self.settle_release(&id) {
                    debug!("Transport confirmed local disconnect of {}", id);
                    return;
                }
                match self.peripheral(&id) {
                    Some(peripheral) => {
                        if let Some(event) = peripheral.handle_remote_disconnect(reason) {
                            peripheral.publish(&central, event);
                        }
                    }
                    None => debug!("Disconnect for unknown peripheral {}", id),
                }
            }
            Notification::ScanStarted {
                generation,
                options,
                result,
            } => self.on_scan_started(&central, generation, options, result),
            Notification::ScanStopped { generation, result } => {
                self.on_scan_stopped(&central, generation, result);
            }
            Notification::Connected {
                peripheral,
                generation,
                result,
            } => {
                if let Some(event) = peripheral.complete_connect(self, generation, result) {
                    peripheral.publish(&central, event);
                }
            }
            Notification::RssiRead {
                peripheral,
                generation,
                result,
            } => {
                if let Some(event) = peripheral.complete_rssi(generation, result) {
                    peripheral.publish(&central, event);
                }
            }
            Notification::ServicesDiscovered {
                peripheral,
                generation,
                filter,
                result,
            } => {
                if let Some(event) = peripheral.complete_discovery(generation, &filter, result) {
                    peripheral.publish(&central, event);
                }
            }
            Notification::Deferred { peripheral, event } => peripheral.publish(&central, event),
            Notification::LinkReleased { id } => {
                self.settle_release(&id);
            }
        }
    }

    fn on_state_change(&self, central: &Central, state: AdapterState) {
        let (scan_stopped, dropped) = {
            let mut adapter = self.adapter();
            let Some(transition) = adapter.apply(state) else {
                debug!("Adapter state unchanged ({})", state);
                return;
            };
            info!("Adapter state: {} -> {}", transition.from, transition.to);

            let mut scan_stopped = false;
            let mut dropped = Vec::new();
            if transition.lost_power() {
                scan_stopped = self.scan().reset();
                let table = self
                    .peripherals
                    .read()
                    .expect("peripheral table lock poisoned");
                for peripheral in table.values() {
                    if let Some(event) = peripheral.drop_link(DisconnectReason::AdapterPoweredOff) {
                        dropped.push((peripheral.clone(), event));
                    }
                }
            }
            (scan_stopped, dropped)
        };

        central.emit(&CentralEvent::StateChange { state });
        if scan_stopped {
            info!("Scan stopped (adapter {})", state);
            central.emit(&CentralEvent::ScanStop);
        }
        for (peripheral, event) in dropped {
            peripheral.publish(central, event);
        }
    }

    fn on_advertisement(self: &Arc<Self>, central: &Central, report: AdvertisementReport) {
        let verdict = self.scan().should_report(&report.id, &report.advertisement);
        let peripheral = self.upsert(&report.id, &report.advertisement);
        match verdict {
            ScanVerdict::Report => {
                debug!("Discovered {} (RSSI: {:?})", report.id, report.rssi);
                central.emit(&CentralEvent::PeripheralDiscover {
                    peripheral,
                    advertisement: report.advertisement,
                    rssi: report.rssi,
                });
            }
            ScanVerdict::Duplicate => debug!("Suppressing duplicate advertisement from {}", report.id),
            ScanVerdict::Ignore => {}
        }
    }

    fn on_scan_started(
        &self,
        central: &Central,
        generation: u64,
        options: ScanOptions,
        result: Result<()>,
    ) {
        if !self.scan().complete_start(generation, result.is_ok()) {
            return;
        }
        match result {
            Ok(()) => {
                info!("Scan started");
                central.emit(&CentralEvent::ScanStart { options });
            }
            Err(e) => {
                warn!("Failed to start scan: {}", e);
                central.emit(&CentralEvent::ScanFailure {
                    reason: e.to_string(),
                });
            }
        }
    }

    fn on_scan_stopped(&self, central: &Central, generation: u64, result: Result<()>) {
        if !self.scan().complete_stop(generation) {
            return;
        }
        if let Err(e) = result {
            warn!("Transport failed to stop scan: {}", e);
        }
        info!("Scan stopped");
        central.emit(&CentralEvent::ScanStop);
    }

    /// Best-effort cleanup once the driver has stopped.
    async fn teardown(&self) {
        let peripherals: Vec<Peripheral> = self
            .peripherals
            .write()
            .expect("peripheral table lock poisoned")
            .drain()
            .map(|(_, peripheral)| peripheral)
            .collect();

        for peripheral in peripherals {
            if peripheral.drop_link(DisconnectReason::LocalRequest).is_none() {
                continue;
            }
            let request = self.transport.disconnect(peripheral.id());
            if let Err(e) = with_timeout("disconnect", self.config.connect_timeout, request).await {
                warn!("Failed to disconnect {} during shutdown: {}", peripheral.id(), e);
            }
        }

        self.links().clear();

        let stop = self.scan().begin_stop();
        if stop.is_some() {
            let request = self.transport.stop_scan();
            if let Err(e) = with_timeout("stop scan", self.config.scan_timeout, request).await {
                warn!("Failed to stop scan during shutdown: {}", e);
            }
        }
        self.scan().reset();
    }
}

async fn drive(
    weak: Weak<Shared>,
    mut queue: mpsc::UnboundedReceiver<Notification>,
    mut notifications: NotificationStream,
    cancel: CancellationToken,
) {
    let mut transport_open = true;
    loop {
        let notification = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(notification) = queue.recv() => notification,
            event = notifications.next(), if transport_open => match event {
                Some(event) => Notification::Transport(event),
                None => {
                    warn!("Transport notification stream ended");
                    transport_open = false;
                    continue;
                }
            },
        };
        let Some(shared) = weak.upgrade() else {
            break;
        };
        shared.handle(notification);
    }

    if let Some(shared) = weak.upgrade() {
        shared.teardown().await;
    }
    info!("Session manager stopped");
}

/// BLE central session manager.
///
/// Cloning is cheap and clones share the same state.
#[derive(Clone)]
pub struct Central {
    shared: Arc<Shared>,
}

impl fmt::Debug for Central {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Central")
            .field("state", &self.state())
            .field("scan", &self.shared.scan().state())
            .field(
                "peripherals",
                &self
                    .shared
                    .peripherals
                    .read()
                    .expect("peripheral table lock poisoned")
                    .len(),
            )
            .finish_non_exhaustive()
    }
}

impl Central {
    /// Create an idle session manager over `transport`.
    ///
    /// Nothing happens until [`start`](Self::start) is awaited, so
    /// subscribers can be registered first.
    pub fn new<T>(transport: Arc<T>, config: CentralConfig) -> Result<Self>
    where
        T: Transport + 'static,
    {
        config.validate()?;
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                transport,
                adapter: Mutex::new(AdapterStateMachine::new()),
                scan: Mutex::new(ScanController::new()),
                peripherals: RwLock::new(HashMap::new()),
                events: EventEmitter::new(),
                queue_tx,
                queue_rx: Mutex::new(Some(queue_rx)),
                runtime: OnceLock::new(),
                cancel: CancellationToken::new(),
                driver: Mutex::new(None),
                scan_chain: Mutex::new(None),
                links: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Subscribe to the transport, probe the adapter state and spawn the
    /// driver task. The first observed adapter state is reported as a
    /// `stateChange` event.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if already started.
    /// - [`Error::Closed`] after [`shutdown`](Self::shutdown).
    /// - Any error from the transport's subscription or state probe.
    pub async fn start(&self) -> Result<()> {
        let shared = &self.shared;
        shared.ensure_open()?;
        if shared.runtime.get().is_some() {
            return Err(Error::invalid_state("start", "started"));
        }

        let notifications = shared.transport.notifications().await?;
        let initial = shared.transport.adapter_state().await?;

        let queue = shared
            .queue_rx
            .lock()
            .expect("queue lock poisoned")
            .take()
            .ok_or_else(|| Error::invalid_state("start", "started"))?;
        let _ = shared.runtime.set(Handle::current());

        shared.post(Notification::Transport(TransportEvent::StateChange(initial)));
        let driver = tokio::spawn(drive(
            Arc::downgrade(shared),
            queue,
            notifications,
            shared.cancel.clone(),
        ));
        *shared.driver.lock().expect("driver lock poisoned") = Some(driver);
        info!("Session manager started (adapter {})", initial);
        Ok(())
    }

    /// Stop the driver, disconnect live sessions and forget every
    /// peripheral. Peripheral handles held elsewhere fail with
    /// [`Error::Closed`] afterwards.
    pub async fn shutdown(&self) {
        info!("Shutting down session manager");
        self.shared.cancel.cancel();
        let driver = self
            .shared
            .driver
            .lock()
            .expect("driver lock poisoned")
            .take();
        if let Some(driver) = driver
            && let Err(e) = driver.await
        {
            warn!("Driver task failed: {}", e);
        }
    }

    /// Current adapter state.
    pub fn state(&self) -> AdapterState {
        self.shared.adapter().state()
    }

    /// Whether a confirmed scan is running.
    pub fn is_scanning(&self) -> bool {
        self.shared.scan().is_active()
    }

    /// Lifecycle state of the scan, including unconfirmed requests.
    pub fn scan_state(&self) -> ScanState {
        self.shared.scan().state()
    }

    /// Options of the current (or last) scan.
    pub fn scan_options(&self) -> ScanOptions {
        self.shared.scan().options().clone()
    }

    /// Look up a discovered peripheral.
    pub fn peripheral(&self, id: &PeripheralId) -> Option<Peripheral> {
        self.shared.peripheral(id)
    }

    /// All discovered peripherals, ordered by identity.
    pub fn peripherals(&self) -> Vec<Peripheral> {
        let mut peripherals: Vec<Peripheral> = self
            .shared
            .peripherals
            .read()
            .expect("peripheral table lock poisoned")
            .values()
            .cloned()
            .collect();
        peripherals.sort_by(|a, b| a.id().cmp(b.id()));
        peripherals
    }

    /// Disconnect (if needed) and forget a peripheral. A later
    /// advertisement from the same identity creates a fresh session.
    ///
    /// Returns `false` if the peripheral was not known.
    pub fn remove_peripheral(&self, id: &PeripheralId) -> Result<bool> {
        self.shared.ensure_open()?;
        self.shared.scan().forget(id);
        let removed = self
            .shared
            .peripherals
            .write()
            .expect("peripheral table lock poisoned")
            .remove(id);
        match removed {
            Some(peripheral) => {
                peripheral.disconnect()?;
                debug!("Removed peripheral {}", id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Start scanning, or restart with new options if already scanning.
    ///
    /// `scanStart` is emitted when the transport confirms; a transport
    /// error emits `scanFailure` instead.
    ///
    /// # Errors
    ///
    /// [`Error::NotReady`] unless the adapter is powered on. Nothing is
    /// queued in that case.
    pub fn start_scanning(&self, options: ScanOptions) -> Result<()> {
        let shared = &self.shared;
        shared.ensure_open()?;
        let generation = {
            let adapter = shared.adapter();
            adapter.ensure_powered_on()?;
            shared.scan().begin_start(options.clone())
        };

        info!(
            "Starting scan (services: {}, duplicates: {})",
            options.service_uuids.len(),
            options.allow_duplicates
        );
        let transport = shared.transport();
        let timeout = shared.config.scan_timeout;
        let queue = shared.queue();
        shared.chain_scan(async move {
            let result = with_timeout("start scan", timeout, transport.start_scan(&options)).await;
            let _ = queue.send(Notification::ScanStarted {
                generation,
                options,
                result,
            });
        });
        Ok(())
    }

    /// Stop scanning. Does nothing when no scan is running or starting.
    ///
    /// `scanStop` is emitted when the transport confirms.
    pub fn stop_scanning(&self) -> Result<()> {
        let shared = &self.shared;
        shared.ensure_open()?;
        let Some(generation) = shared.scan().begin_stop() else {
            debug!("Not scanning, nothing to stop");
            return Ok(());
        };

        info!("Stopping scan");
        let transport = shared.transport();
        let timeout = shared.config.scan_timeout;
        let queue = shared.queue();
        shared.chain_scan(async move {
            let result = with_timeout("stop scan", timeout, transport.stop_scan()).await;
            let _ = queue.send(Notification::ScanStopped { generation, result });
        });
        Ok(())
    }

    /// Subscribe to a session-manager event (see [`names`](crate::events::names)).
    ///
    /// Callbacks run on the driver task, one at a time. A callback that
    /// panics is logged and skipped; later events are still delivered.
    pub fn on<F>(&self, name: &str, callback: F) -> ListenerId
    where
        F: Fn(&Central, &CentralEvent) + Send + Sync + 'static,
    {
        self.shared.events.on(name, callback)
    }

    /// Subscribe to a session-manager event for one delivery.
    pub fn once<F>(&self, name: &str, callback: F) -> ListenerId
    where
        F: Fn(&Central, &CentralEvent) + Send + Sync + 'static,
    {
        self.shared.events.once(name, callback)
    }

    /// Unsubscribe. Returns `false` if the listener was not registered.
    pub fn off(&self, name: &str, id: ListenerId) -> bool {
        self.shared.events.off(name, id)
    }

    /// Unsubscribe every listener for `name`.
    pub fn remove_all_listeners(&self, name: &str) {
        self.shared.events.remove_all(name);
    }

    /// Number of listeners registered for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.shared.events.listener_count(name)
    }

    pub(crate) fn emit(&self, event: &CentralEvent) {
        self.shared.events.emit(event.name(), self, event);
    }
}
