//! Named-event dispatch for the session manager and its peripherals.
//!
//! Two sinks exist for every peripheral transition: the peripheral's own
//! emitter receives the unqualified event (`connect`, `rssiUpdate`, ...) and
//! the [`Central`](crate::Central) emitter receives the peripheral-qualified
//! counterpart (`peripheralConnect`, `peripheralRssiUpdate`, ...). The local
//! event is always emitted first.
//!
//! Callbacks receive the context object (the `Central` or the `Peripheral`)
//! so they can issue follow-up operations directly:
//!
//! ```ignore
//! central.on(names::PERIPHERAL_DISCOVER, |central, event| {
//!     if let CentralEvent::PeripheralDiscover { peripheral, .. } = event {
//!         let _ = central.stop_scanning();
//!         let _ = peripheral.connect();
//!     }
//! });
//! ```

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::error;

use bluecentral_types::{AdapterState, Advertisement, Service};

use crate::error::ConnectionFailureReason;
use crate::peripheral::Peripheral;
use crate::scan::ScanOptions;

/// Event names, as passed to `on` / `once` / `off`.
pub mod names {
    /// Adapter state transition.
    pub const STATE_CHANGE: &str = "stateChange";
    /// Scan confirmed started.
    pub const SCAN_START: &str = "scanStart";
    /// Scan confirmed stopped.
    pub const SCAN_STOP: &str = "scanStop";
    /// Scan could not be started.
    pub const SCAN_FAILURE: &str = "scanFailure";
    /// A peripheral was discovered (or its advertisement changed).
    pub const PERIPHERAL_DISCOVER: &str = "peripheralDiscover";
    pub const PERIPHERAL_CONNECT: &str = "peripheralConnect";
    pub const PERIPHERAL_CONNECT_FAILURE: &str = "peripheralConnectFailure";
    pub const PERIPHERAL_DISCONNECT: &str = "peripheralDisconnect";
    pub const PERIPHERAL_RSSI_UPDATE: &str = "peripheralRssiUpdate";
    pub const PERIPHERAL_RSSI_UPDATE_FAILURE: &str = "peripheralRssiUpdateFailure";
    pub const PERIPHERAL_SERVICES_DISCOVER: &str = "peripheralServicesDiscover";
    pub const PERIPHERAL_SERVICES_DISCOVER_FAILURE: &str = "peripheralServicesDiscoverFailure";

    // Per-peripheral events.
    pub const CONNECT: &str = "connect";
    pub const CONNECT_FAILURE: &str = "connectFailure";
    pub const DISCONNECT: &str = "disconnect";
    pub const RSSI_UPDATE: &str = "rssiUpdate";
    pub const RSSI_UPDATE_FAILURE: &str = "rssiUpdateFailure";
    pub const SERVICES_DISCOVER: &str = "servicesDiscover";
    pub const SERVICES_DISCOVER_FAILURE: &str = "servicesDiscoverFailure";
}

/// Reason a peripheral session ended.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// `disconnect()` was called locally.
    LocalRequest,
    /// The peripheral closed the link.
    RemoteTerminated,
    /// Peripheral went out of range (supervision timeout).
    OutOfRange,
    /// The local adapter left the `poweredOn` state.
    AdapterPoweredOff,
    /// BLE error occurred.
    BleError(String),
    /// Unknown reason.
    Unknown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalRequest => write!(f, "local request"),
            Self::RemoteTerminated => write!(f, "remote terminated"),
            Self::OutOfRange => write!(f, "out of range"),
            Self::AdapterPoweredOff => write!(f, "adapter powered off"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Events emitted on a [`Central`](crate::Central).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CentralEvent {
    StateChange {
        state: AdapterState,
    },
    ScanStart {
        options: ScanOptions,
    },
    ScanStop,
    ScanFailure {
        reason: String,
    },
    PeripheralDiscover {
        peripheral: Peripheral,
        advertisement: Advertisement,
        /// RSSI of the advertising packet, when the stack reports one.
        rssi: Option<i16>,
    },
    PeripheralConnect {
        peripheral: Peripheral,
    },
    PeripheralConnectFailure {
        peripheral: Peripheral,
        reason: ConnectionFailureReason,
    },
    PeripheralDisconnect {
        peripheral: Peripheral,
        reason: DisconnectReason,
    },
    PeripheralRssiUpdate {
        peripheral: Peripheral,
        rssi: i16,
    },
    PeripheralRssiUpdateFailure {
        peripheral: Peripheral,
        reason: String,
    },
    PeripheralServicesDiscover {
        peripheral: Peripheral,
        services: Vec<Service>,
    },
    PeripheralServicesDiscoverFailure {
        peripheral: Peripheral,
        reason: String,
    },
}

impl CentralEvent {
    /// The event name subscribers register under.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StateChange { .. } => names::STATE_CHANGE,
            Self::ScanStart { .. } => names::SCAN_START,
            Self::ScanStop => names::SCAN_STOP,
            Self::ScanFailure { .. } => names::SCAN_FAILURE,
            Self::PeripheralDiscover { .. } => names::PERIPHERAL_DISCOVER,
            Self::PeripheralConnect { .. } => names::PERIPHERAL_CONNECT,
            Self::PeripheralConnectFailure { .. } => names::PERIPHERAL_CONNECT_FAILURE,
            Self::PeripheralDisconnect { .. } => names::PERIPHERAL_DISCONNECT,
            Self::PeripheralRssiUpdate { .. } => names::PERIPHERAL_RSSI_UPDATE,
            Self::PeripheralRssiUpdateFailure { .. } => names::PERIPHERAL_RSSI_UPDATE_FAILURE,
            Self::PeripheralServicesDiscover { .. } => names::PERIPHERAL_SERVICES_DISCOVER,
            Self::PeripheralServicesDiscoverFailure { .. } => {
                names::PERIPHERAL_SERVICES_DISCOVER_FAILURE
            }
        }
    }

    /// The peripheral this event concerns, if any.
    pub fn peripheral(&self) -> Option<&Peripheral> {
        match self {
            Self::PeripheralDiscover { peripheral, .. }
            | Self::PeripheralConnect { peripheral }
            | Self::PeripheralConnectFailure { peripheral, .. }
            | Self::PeripheralDisconnect { peripheral, .. }
            | Self::PeripheralRssiUpdate { peripheral, .. }
            | Self::PeripheralRssiUpdateFailure { peripheral, .. }
            | Self::PeripheralServicesDiscover { peripheral, .. }
            | Self::PeripheralServicesDiscoverFailure { peripheral, .. } => Some(peripheral),
            Self::StateChange { .. }
            | Self::ScanStart { .. }
            | Self::ScanStop
            | Self::ScanFailure { .. } => None,
        }
    }
}

/// Events emitted on a single [`Peripheral`].
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
#[non_exhaustive]
pub enum PeripheralEvent {
    Connect,
    ConnectFailure { reason: ConnectionFailureReason },
    Disconnect { reason: DisconnectReason },
    RssiUpdate { rssi: i16 },
    RssiUpdateFailure { reason: String },
    ServicesDiscover { services: Vec<Service> },
    ServicesDiscoverFailure { reason: String },
}

impl PeripheralEvent {
    /// The event name subscribers register under.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => names::CONNECT,
            Self::ConnectFailure { .. } => names::CONNECT_FAILURE,
            Self::Disconnect { .. } => names::DISCONNECT,
            Self::RssiUpdate { .. } => names::RSSI_UPDATE,
            Self::RssiUpdateFailure { .. } => names::RSSI_UPDATE_FAILURE,
            Self::ServicesDiscover { .. } => names::SERVICES_DISCOVER,
            Self::ServicesDiscoverFailure { .. } => names::SERVICES_DISCOVER_FAILURE,
        }
    }

    /// The peripheral-qualified global counterpart of this event.
    pub fn qualify(&self, peripheral: &Peripheral) -> CentralEvent {
        let peripheral = peripheral.clone();
        match self.clone() {
            Self::Connect => CentralEvent::PeripheralConnect { peripheral },
            Self::ConnectFailure { reason } => {
                CentralEvent::PeripheralConnectFailure { peripheral, reason }
            }
            Self::Disconnect { reason } => CentralEvent::PeripheralDisconnect { peripheral, reason },
            Self::RssiUpdate { rssi } => CentralEvent::PeripheralRssiUpdate { peripheral, rssi },
            Self::RssiUpdateFailure { reason } => {
                CentralEvent::PeripheralRssiUpdateFailure { peripheral, reason }
            }
            Self::ServicesDiscover { services } => {
                CentralEvent::PeripheralServicesDiscover {
                    peripheral,
                    services,
                }
            }
            Self::ServicesDiscoverFailure { reason } => {
                CentralEvent::PeripheralServicesDiscoverFailure { peripheral, reason }
            }
        }
    }
}

/// Handle returned by [`EventEmitter::on`], used to unregister a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A registered callback. Receives the context object and the event.
pub type Listener<C, E> = Arc<dyn Fn(&C, &E) + Send + Sync>;

struct Registration<C, E> {
    id: ListenerId,
    callback: Listener<C, E>,
    /// Set for `once` registrations; flips on first delivery.
    fired: Option<Arc<AtomicBool>>,
}

impl<C, E> Clone for Registration<C, E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Arc::clone(&self.callback),
            fired: self.fired.clone(),
        }
    }
}

/// Ordered multi-subscriber dispatch keyed by event name.
///
/// Callbacks for a name run in registration order. The same closure may be
/// registered more than once and then fires once per registration.
pub struct EventEmitter<C, E> {
    listeners: Mutex<HashMap<String, Vec<Registration<C, E>>>>,
    next_id: AtomicU64,
}

impl<C, E> Default for EventEmitter<C, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, E> fmt::Debug for EventEmitter<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock().expect("emitter lock poisoned");
        let counts: HashMap<&str, usize> = listeners
            .iter()
            .map(|(name, regs)| (name.as_str(), regs.len()))
            .collect();
        f.debug_struct("EventEmitter")
            .field("listeners", &counts)
            .finish()
    }
}

impl<C, E> EventEmitter<C, E> {
    /// Create an emitter with no subscribers.
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `callback` for `name`.
    pub fn on<F>(&self, name: &str, callback: F) -> ListenerId
    where
        F: Fn(&C, &E) + Send + Sync + 'static,
    {
        self.register(name, Arc::new(callback), None)
    }

    /// Register `callback` for `name`, removing it after its first call.
    pub fn once<F>(&self, name: &str, callback: F) -> ListenerId
    where
        F: Fn(&C, &E) + Send + Sync + 'static,
    {
        self.register(name, Arc::new(callback), Some(Arc::new(AtomicBool::new(false))))
    }

    fn register(
        &self,
        name: &str,
        callback: Listener<C, E>,
        fired: Option<Arc<AtomicBool>>,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.listeners.lock().expect("emitter lock poisoned");
        listeners
            .entry(name.to_string())
            .or_default()
            .push(Registration {
                id,
                callback,
                fired,
            });
        id
    }

    /// Unregister one callback. Returns `false` if it was not registered.
    pub fn off(&self, name: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().expect("emitter lock poisoned");
        let Some(regs) = listeners.get_mut(name) else {
            return false;
        };
        let before = regs.len();
        regs.retain(|r| r.id != id);
        let removed = regs.len() != before;
        if regs.is_empty() {
            listeners.remove(name);
        }
        removed
    }

    /// Unregister every callback for `name`.
    pub fn remove_all(&self, name: &str) {
        self.listeners
            .lock()
            .expect("emitter lock poisoned")
            .remove(name);
    }

    /// Number of callbacks currently registered for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners
            .lock()
            .expect("emitter lock poisoned")
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to every callback registered for `name`.
    ///
    /// The callback list is snapshotted before the first call, so callbacks
    /// may register or unregister listeners (including themselves) without
    /// affecting this pass. The lock is not held while callbacks run.
    ///
    /// A callback that panics is logged and counted as invoked; the remaining
    /// callbacks still run.
    ///
    /// Returns the number of callbacks invoked.
    pub fn emit(&self, name: &str, ctx: &C, event: &E) -> usize {
        let snapshot: Vec<Registration<C, E>> = {
            let listeners = self.listeners.lock().expect("emitter lock poisoned");
            match listeners.get(name) {
                Some(regs) => regs.clone(),
                None => return 0,
            }
        };

        let mut invoked = 0;
        for reg in snapshot {
            if let Some(fired) = &reg.fired {
                if fired.swap(true, Ordering::AcqRel) {
                    continue;
                }
                self.off(name, reg.id);
            }
            let callback = &reg.callback;
            if panic::catch_unwind(AssertUnwindSafe(|| callback(ctx, event))).is_err() {
                error!("Listener for '{}' panicked", name);
            }
            invoked += 1;
        }
        invoked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    type TestEmitter = EventEmitter<(), u32>;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Listener<(), u32>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = Arc::clone(&log);
        let make = move |tag: &str| -> Listener<(), u32> {
            let log = Arc::clone(&log2);
            let tag = tag.to_string();
            Arc::new(move |_: &(), value: &u32| {
                log.lock().unwrap().push(format!("{tag}:{value}"));
            })
        };
        (log, make)
    }

    #[test]
    fn test_emit_in_registration_order() {
        let emitter = TestEmitter::new();
        let (log, make) = recorder();
        let a = make("a");
        let b = make("b");
        emitter.on("tick", move |c, e| a(c, e));
        emitter.on("tick", move |c, e| b(c, e));

        assert_eq!(emitter.emit("tick", &(), &7), 2);
        assert_eq!(*log.lock().unwrap(), vec!["a:7", "b:7"]);
    }

    #[test]
    fn test_unknown_name_is_silent() {
        let emitter = TestEmitter::new();
        assert_eq!(emitter.emit("nobody-listens", &(), &1), 0);
        assert_eq!(emitter.listener_count("nobody-listens"), 0);
    }

    #[test]
    fn test_duplicate_registration_fires_twice() {
        let emitter = TestEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let callback: Listener<(), u32> = {
            let count = Arc::clone(&count);
            Arc::new(move |_, _| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        let c1 = Arc::clone(&callback);
        let c2 = Arc::clone(&callback);
        emitter.on("x", move |c, e| c1(c, e));
        emitter.on("x", move |c, e| c2(c, e));

        emitter.emit("x", &(), &0);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_off_removes_only_that_listener() {
        let emitter = TestEmitter::new();
        let (log, make) = recorder();
        let a = make("a");
        let b = make("b");
        let id = emitter.on("x", move |c, e| a(c, e));
        emitter.on("x", move |c, e| b(c, e));

        assert!(emitter.off("x", id));
        assert!(!emitter.off("x", id));
        assert!(!emitter.off("other", id));
        emitter.emit("x", &(), &1);
        assert_eq!(*log.lock().unwrap(), vec!["b:1"]);
    }

    #[test]
    fn test_once_fires_once() {
        let emitter = TestEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        emitter.once("x", move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(emitter.listener_count("x"), 1);
        assert_eq!(emitter.emit("x", &(), &0), 1);
        assert_eq!(emitter.emit("x", &(), &0), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count("x"), 0);
    }

    #[test]
    fn test_remove_all() {
        let emitter = TestEmitter::new();
        emitter.on("x", |_, _| {});
        emitter.on("x", |_, _| {});
        emitter.on("y", |_, _| {});
        emitter.remove_all("x");
        assert_eq!(emitter.listener_count("x"), 0);
        assert_eq!(emitter.listener_count("y"), 1);
    }

    #[test]
    fn test_unregister_during_emit_keeps_snapshot() {
        let emitter = Arc::new(TestEmitter::new());
        let (log, make) = recorder();
        let second_id = Arc::new(Mutex::new(None::<ListenerId>));

        {
            let emitter2 = Arc::clone(&emitter);
            let second_id = Arc::clone(&second_id);
            let a = make("a");
            emitter.on("x", move |c, e| {
                a(c, e);
                if let Some(id) = *second_id.lock().unwrap() {
                    emitter2.off("x", id);
                }
            });
        }
        let b = make("b");
        *second_id.lock().unwrap() = Some(emitter.on("x", move |c, e| b(c, e)));

        // Already scheduled for this pass, so "b" still runs.
        assert_eq!(emitter.emit("x", &(), &1), 2);
        // Gone for the next pass.
        assert_eq!(emitter.emit("x", &(), &2), 1);
        assert_eq!(*log.lock().unwrap(), vec!["a:1", "b:1", "a:2"]);
    }

    #[test]
    fn test_register_during_emit_waits_for_next_pass() {
        let emitter = Arc::new(TestEmitter::new());
        let count = Arc::new(AtomicUsize::new(0));
        {
            let emitter2 = Arc::clone(&emitter);
            let count = Arc::clone(&count);
            emitter.once("x", move |_, _| {
                let count = Arc::clone(&count);
                emitter2.on("x", move |_, _| {
                    count.fetch_add(1, Ordering::SeqCst);
                });
            });
        }
        assert_eq!(emitter.emit("x", &(), &0), 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(emitter.emit("x", &(), &0), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_dispatch() {
        let emitter = TestEmitter::new();
        let (log, make) = recorder();
        let after = make("after");
        emitter.on("tick", |_, _| panic!("listener bug"));
        emitter.on("tick", move |c, e| after(c, e));

        assert_eq!(emitter.emit("tick", &(), &1), 2);
        assert_eq!(emitter.emit("tick", &(), &2), 2);
        assert_eq!(*log.lock().unwrap(), vec!["after:1", "after:2"]);
    }

    #[test]
    fn test_peripheral_event_names() {
        assert_eq!(PeripheralEvent::Connect.name(), "connect");
        assert_eq!(
            PeripheralEvent::RssiUpdate { rssi: -60 }.name(),
            "rssiUpdate"
        );
        assert_eq!(
            PeripheralEvent::Disconnect {
                reason: DisconnectReason::LocalRequest
            }
            .name(),
            "disconnect"
        );
    }

    #[test]
    fn test_central_event_names() {
        assert_eq!(
            CentralEvent::StateChange {
                state: AdapterState::PoweredOn
            }
            .name(),
            "stateChange"
        );
        assert_eq!(CentralEvent::ScanStop.name(), "scanStop");
        assert!(CentralEvent::ScanStop.peripheral().is_none());
    }

    #[test]
    fn test_peripheral_event_serialization() {
        let event = PeripheralEvent::RssiUpdate { rssi: -62 };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"rssiUpdate","rssi":-62}"#);

        let event = PeripheralEvent::Disconnect {
            reason: DisconnectReason::AdapterPoweredOff,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: PeripheralEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(DisconnectReason::LocalRequest.to_string(), "local request");
        assert_eq!(
            DisconnectReason::BleError("gone".into()).to_string(),
            "BLE error: gone"
        );
    }
}
