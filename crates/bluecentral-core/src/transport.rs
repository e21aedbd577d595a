//! The radio abstraction consumed by the session manager.
//!
//! A [`Transport`] executes radio requests and reports what the radio sees.
//! It holds no session state of its own: the session manager decides which
//! requests to issue and which notifications to surface.

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use bluecentral_types::{AdapterState, Advertisement, PeripheralId, Service};

use crate::error::Result;
use crate::events::DisconnectReason;
use crate::scan::ScanOptions;

/// One received advertisement (or scan response).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementReport {
    pub id: PeripheralId,
    pub advertisement: Advertisement,
    /// Signal strength of this packet in dBm, if the stack reports one.
    pub rssi: Option<i16>,
}

/// Unsolicited notifications from the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The adapter reported a (possibly unchanged) state.
    StateChange(AdapterState),
    /// An advertisement was received.
    Advertisement(AdvertisementReport),
    /// A link went down without a local request, or a local request was
    /// confirmed.
    Disconnected {
        id: PeripheralId,
        reason: DisconnectReason,
    },
}

/// Stream of transport notifications, in the order the radio produced them.
pub type NotificationStream = BoxStream<'static, TransportEvent>;

/// Radio capabilities needed by the session manager.
///
/// Implementations must be cheap to call concurrently; the session manager
/// issues each request from its own task and applies the configured
/// timeouts itself.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use bluecentral_core::{Central, CentralConfig, MockTransport};
///
/// let transport = Arc::new(MockTransport::new());
/// let central = Central::new(transport, CentralConfig::default())?;
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Current adapter state.
    async fn adapter_state(&self) -> Result<AdapterState>;

    /// Subscribe to unsolicited notifications.
    ///
    /// Called once, when the session manager starts.
    async fn notifications(&self) -> Result<NotificationStream>;

    /// Start (or restart with new filters) a discovery scan.
    async fn start_scan(&self, options: &ScanOptions) -> Result<()>;

    /// Stop the discovery scan.
    async fn stop_scan(&self) -> Result<()>;

    /// Establish a link to a peripheral.
    async fn connect(&self, id: &PeripheralId) -> Result<()>;

    /// Tear a link down.
    ///
    /// Returns `true` when a live link was dropped. The transport must then
    /// also report it with a [`TransportEvent::Disconnected`] notification,
    /// queued before this call returns.
    async fn disconnect(&self, id: &PeripheralId) -> Result<bool>;

    /// Read the signal strength of a connected peripheral in dBm.
    ///
    /// More negative values indicate weaker signals.
    /// Typical values range from -30 (strong) to -90 (weak).
    async fn read_rssi(&self, id: &PeripheralId) -> Result<i16>;

    /// Enumerate the services of a connected peripheral.
    ///
    /// `filter` is a hint; implementations may return more services than
    /// requested and the session manager filters the result.
    async fn discover_services(&self, id: &PeripheralId, filter: &[Uuid]) -> Result<Vec<Service>>;
}
