//! Per-peripheral session state machine.
//!
//! A [`Peripheral`] is created by the session manager the first time an
//! advertisement from its identity is seen, and lives until the manager shuts
//! down or the peripheral is removed explicitly. Its connection state moves
//! along `disconnected → connecting → connected → disconnected` only; there
//! is no public mutator.
//!
//! Requests are non-blocking: they validate and update the session, hand the
//! radio work to the runtime and return. Results arrive as events, first on
//! the peripheral itself (`connect`, `rssiUpdate`, ...) and then on the
//! [`Central`](crate::Central) (`peripheralConnect`, `peripheralRssiUpdate`,
//! ...).
//!
//! Every request is stamped with the session generation, which changes
//! whenever a connection attempt begins or the session drops back to
//! `disconnected`. A completion carrying an older generation is discarded.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, info, warn};
use uuid::Uuid;

use bluecentral_types::{Advertisement, ConnectionState, PeripheralId, Service};

use crate::central::{Central, Notification, Shared};
use crate::error::{Error, Result};
use crate::events::{CentralEvent, DisconnectReason, EventEmitter, ListenerId, PeripheralEvent};
use crate::util::with_timeout;

#[derive(Debug, Default)]
struct Session {
    state: ConnectionState,
    generation: u64,
    advertisement: Advertisement,
    rssi: Option<i16>,
    services: Option<Vec<Service>>,
    rssi_pending: bool,
    discovery_pending: bool,
}

impl Session {
    /// Move to `disconnected`, invalidating outstanding requests.
    fn end(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.generation += 1;
        self.rssi_pending = false;
        self.discovery_pending = false;
    }
}

struct Inner {
    id: PeripheralId,
    central: Weak<Shared>,
    session: Mutex<Session>,
    events: EventEmitter<Peripheral, PeripheralEvent>,
}

/// Handle to a discovered peripheral and its session.
///
/// Cloning is cheap and clones refer to the same session.
#[derive(Clone)]
pub struct Peripheral {
    inner: Arc<Inner>,
}

impl PartialEq for Peripheral {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Peripheral {}

impl fmt::Debug for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.session();
        f.debug_struct("Peripheral")
            .field("id", &self.inner.id)
            .field("name", &session.advertisement.local_name)
            .field("state", &session.state)
            .finish_non_exhaustive()
    }
}

impl Peripheral {
    pub(crate) fn new(id: PeripheralId, advertisement: Advertisement, central: Weak<Shared>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                central,
                session: Mutex::new(Session {
                    advertisement,
                    ..Session::default()
                }),
                events: EventEmitter::new(),
            }),
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.inner.session.lock().expect("session lock poisoned")
    }

    fn shared(&self) -> Result<Arc<Shared>> {
        self.inner
            .central
            .upgrade()
            .filter(|shared| !shared.is_closed())
            .ok_or(Error::Closed)
    }

    /// Identity of this peripheral.
    pub fn id(&self) -> &PeripheralId {
        &self.inner.id
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.session().state
    }

    /// Most recent advertisement payload.
    pub fn advertisement(&self) -> Advertisement {
        self.session().advertisement.clone()
    }

    /// Advertised local name, if any.
    pub fn local_name(&self) -> Option<String> {
        self.session().advertisement.local_name.clone()
    }

    /// Result of the last successful RSSI read.
    pub fn rssi(&self) -> Option<i16> {
        self.session().rssi
    }

    /// Services from the last successful discovery.
    pub fn services(&self) -> Option<Vec<Service>> {
        self.session().services.clone()
    }

    /// Subscribe to a per-peripheral event (see [`names`](crate::events::names)).
    pub fn on<F>(&self, name: &str, callback: F) -> ListenerId
    where
        F: Fn(&Peripheral, &PeripheralEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(name, callback)
    }

    /// Subscribe to a per-peripheral event for one delivery.
    pub fn once<F>(&self, name: &str, callback: F) -> ListenerId
    where
        F: Fn(&Peripheral, &PeripheralEvent) + Send + Sync + 'static,
    {
        self.inner.events.once(name, callback)
    }

    /// Unsubscribe. Returns `false` if the listener was not registered.
    pub fn off(&self, name: &str, id: ListenerId) -> bool {
        self.inner.events.off(name, id)
    }

    /// Unsubscribe every listener for `name`.
    pub fn remove_all_listeners(&self, name: &str) {
        self.inner.events.remove_all(name);
    }

    /// Request a connection.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`] unless the adapter is powered on.
    /// - [`Error::InvalidState`] when already connected.
    ///
    /// A call while a connection attempt is pending is coalesced into that
    /// attempt and returns `Ok`.
    pub fn connect(&self) -> Result<()> {
        let shared = self.shared()?;
        let generation = {
            let adapter = shared.adapter();
            adapter.ensure_powered_on()?;
            let mut session = self.session();
            match session.state {
                ConnectionState::Connected => {
                    return Err(Error::invalid_state("connect", ConnectionState::Connected));
                }
                ConnectionState::Connecting => {
                    debug!("Connect to {} already pending, coalescing", self.id());
                    return Ok(());
                }
                ConnectionState::Disconnected => {}
            }
            session.generation += 1;
            session.state = ConnectionState::Connecting;
            session.generation
        };

        info!("Connecting to {}...", self.id());
        let transport = shared.transport();
        let timeout = shared.config().connect_timeout;
        let queue = shared.queue();
        let peripheral = self.clone();
        shared.chain_link(self.id(), async move {
            let id = peripheral.id().clone();
            let result = with_timeout("connect", timeout, transport.connect(&id)).await;
            let _ = queue.send(Notification::Connected {
                peripheral,
                generation,
                result,
            });
        });
        Ok(())
    }

    /// Drop the connection, or abandon a pending connection attempt.
    ///
    /// The session is `disconnected` when this returns. The `disconnect`
    /// event is queued and delivered after the current callback (if any)
    /// returns. Calling this on a disconnected peripheral does nothing.
    pub fn disconnect(&self) -> Result<()> {
        let shared = self.shared()?;
        {
            let mut session = self.session();
            if session.state == ConnectionState::Disconnected {
                return Ok(());
            }
            session.end();
        }

        info!("Disconnecting from {}...", self.id());
        shared.post(Notification::Deferred {
            peripheral: self.clone(),
            event: PeripheralEvent::Disconnect {
                reason: DisconnectReason::LocalRequest,
            },
        });
        self.request_teardown(&shared);
        Ok(())
    }

    /// Request an RSSI read.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] unless connected.
    /// - [`Error::AlreadyInProgress`] while a read is pending.
    pub fn update_rssi(&self) -> Result<()> {
        let shared = self.shared()?;
        let generation = {
            let mut session = self.session();
            if session.state != ConnectionState::Connected {
                return Err(Error::NotConnected);
            }
            if session.rssi_pending {
                return Err(Error::AlreadyInProgress {
                    operation: "updateRssi",
                });
            }
            session.rssi_pending = true;
            session.generation
        };

        debug!("Reading RSSI of {}", self.id());
        let transport = shared.transport();
        let timeout = shared.config().rssi_timeout;
        let peripheral = self.clone();
        shared.dispatch(async move {
            let id = peripheral.id().clone();
            let result = with_timeout("read RSSI", timeout, transport.read_rssi(&id)).await;
            Notification::RssiRead {
                peripheral,
                generation,
                result,
            }
        });
        Ok(())
    }

    /// Request service discovery. An empty `service_uuids` discovers every
    /// service; otherwise only the listed services are kept.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] unless connected.
    /// - [`Error::AlreadyInProgress`] while a discovery is pending.
    pub fn discover_services(&self, service_uuids: &[Uuid]) -> Result<()> {
        let shared = self.shared()?;
        let generation = {
            let mut session = self.session();
            if session.state != ConnectionState::Connected {
                return Err(Error::NotConnected);
            }
            if session.discovery_pending {
                return Err(Error::AlreadyInProgress {
                    operation: "discoverServices",
                });
            }
            session.discovery_pending = true;
            session.generation
        };

        debug!(
            "Discovering services on {} (filter: {} UUIDs)",
            self.id(),
            service_uuids.len()
        );
        let transport = shared.transport();
        let timeout = shared.config().discovery_timeout;
        let peripheral = self.clone();
        let filter = service_uuids.to_vec();
        shared.dispatch(async move {
            let id = peripheral.id().clone();
            let result = with_timeout(
                "discover services",
                timeout,
                transport.discover_services(&id, &filter),
            )
            .await;
            Notification::ServicesDiscovered {
                peripheral,
                generation,
                filter,
                result,
            }
        });
        Ok(())
    }

    /// Ask the transport to drop the link, after any earlier link request
    /// for this identity.
    ///
    /// The transport's disconnect notification for this teardown may arrive
    /// after a newer connection is up; it is consumed as a confirmation
    /// rather than treated as link loss.
    fn request_teardown(&self, shared: &Shared) {
        shared.expect_release(self.id());
        let transport = shared.transport();
        let timeout = shared.config().connect_timeout;
        let queue = shared.queue();
        let id = self.id().clone();
        shared.chain_link(self.id(), async move {
            let request = transport.disconnect(&id);
            let confirmed = match with_timeout("disconnect", timeout, request).await {
                Ok(dropped) => dropped,
                Err(e) => {
                    warn!("Transport disconnect of {} failed: {}", id, e);
                    false
                }
            };
            if !confirmed {
                let _ = queue.send(Notification::LinkReleased { id });
            }
        });
    }

    // --- Driver-side transitions ---

    pub(crate) fn update_advertisement(&self, advertisement: Advertisement) {
        self.session().advertisement = advertisement;
    }

    pub(crate) fn complete_connect(
        &self,
        shared: &Shared,
        generation: u64,
        result: Result<()>,
    ) -> Option<PeripheralEvent> {
        let mut session = self.session();
        if session.generation != generation || session.state != ConnectionState::Connecting {
            debug!("Discarding stale connect completion for {}", self.id());
            let orphaned_link = result.is_ok() && session.state == ConnectionState::Disconnected;
            drop(session);
            if orphaned_link {
                self.request_teardown(shared);
            }
            return None;
        }
        match result {
            Ok(()) => {
                session.state = ConnectionState::Connected;
                info!("Connected to {}", self.id());
                Some(PeripheralEvent::Connect)
            }
            Err(e) => {
                session.state = ConnectionState::Disconnected;
                warn!("Connection to {} failed: {}", self.id(), e);
                Some(PeripheralEvent::ConnectFailure { reason: (&e).into() })
            }
        }
    }

    pub(crate) fn complete_rssi(&self, generation: u64, result: Result<i16>) -> Option<PeripheralEvent> {
        let mut session = self.session();
        if session.generation != generation || session.state != ConnectionState::Connected {
            debug!("Discarding stale RSSI completion for {}", self.id());
            return None;
        }
        session.rssi_pending = false;
        match result {
            Ok(rssi) => {
                session.rssi = Some(rssi);
                debug!("RSSI of {}: {} dBm", self.id(), rssi);
                Some(PeripheralEvent::RssiUpdate { rssi })
            }
            Err(e) => {
                warn!("RSSI read from {} failed: {}", self.id(), e);
                Some(PeripheralEvent::RssiUpdateFailure {
                    reason: e.to_string(),
                })
            }
        }
    }

    pub(crate) fn complete_discovery(
        &self,
        generation: u64,
        filter: &[Uuid],
        result: Result<Vec<Service>>,
    ) -> Option<PeripheralEvent> {
        let mut session = self.session();
        if session.generation != generation || session.state != ConnectionState::Connected {
            debug!("Discarding stale discovery completion for {}", self.id());
            return None;
        }
        session.discovery_pending = false;
        match result {
            Ok(mut services) => {
                if !filter.is_empty() {
                    services.retain(|s| filter.contains(&s.uuid));
                }
                session.services = Some(services.clone());
                debug!("Discovered {} services on {}", services.len(), self.id());
                Some(PeripheralEvent::ServicesDiscover { services })
            }
            Err(e) => {
                warn!("Service discovery on {} failed: {}", self.id(), e);
                Some(PeripheralEvent::ServicesDiscoverFailure {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Link loss reported by the transport. Only an established link can be
    /// lost; a pending attempt is settled by its own completion.
    pub(crate) fn handle_remote_disconnect(
        &self,
        reason: DisconnectReason,
    ) -> Option<PeripheralEvent> {
        let mut session = self.session();
        if session.state != ConnectionState::Connected {
            debug!(
                "Ignoring transport disconnect for {} while {}",
                self.id(),
                session.state
            );
            return None;
        }
        session.end();
        info!("{} disconnected: {}", self.id(), reason);
        Some(PeripheralEvent::Disconnect { reason })
    }

    /// Force the session down without asking the transport.
    pub(crate) fn drop_link(&self, reason: DisconnectReason) -> Option<PeripheralEvent> {
        let mut session = self.session();
        if session.state == ConnectionState::Disconnected {
            return None;
        }
        session.end();
        Some(PeripheralEvent::Disconnect { reason })
    }

    /// Emit locally, then as the peripheral-qualified event on `central`.
    pub(crate) fn publish(&self, central: &Central, event: PeripheralEvent) {
        self.inner.events.emit(event.name(), self, &event);
        let global: CentralEvent = event.qualify(self);
        central.emit(&global);
    }
}
