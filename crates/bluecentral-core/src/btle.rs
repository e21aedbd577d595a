//! Radio transport backed by btleplug.
//!
//! Uses the first adapter reported by the platform. Peripherals are
//! identified by their Bluetooth address, or by the CoreBluetooth UUID on
//! macOS where addresses are hidden (see [`create_identifier`]).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{
    Central as _, CentralEvent as BtleEvent, CentralState, Manager as _, Peripheral as _,
    PeripheralProperties, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral as BtlePeripheral};
use futures::StreamExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bluecentral_types::{AdapterState, Advertisement, PeripheralId, Service};

use crate::error::{Error, Result};
use crate::events::DisconnectReason;
use crate::scan::ScanOptions;
use crate::transport::{AdvertisementReport, NotificationStream, Transport, TransportEvent};
use crate::util::create_identifier;

type PeripheralCache = Arc<RwLock<HashMap<PeripheralId, BtlePeripheral>>>;

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters.into_iter().next().ok_or(Error::AdapterNotFound)
}

/// [`Transport`] over a btleplug adapter.
#[derive(Debug, Clone)]
pub struct BtleplugTransport {
    adapter: Adapter,
    /// Identity → platform peripheral, filled as advertisements arrive.
    known: PeripheralCache,
}

impl BtleplugTransport {
    /// Use the first adapter reported by the platform.
    ///
    /// # Errors
    ///
    /// [`Error::AdapterNotFound`] if the platform reports no adapter, or a
    /// Bluetooth error if the platform manager cannot be created.
    pub async fn new() -> Result<Self> {
        let adapter = get_adapter().await?;
        if let Ok(info) = adapter.adapter_info().await {
            info!("Using Bluetooth adapter {}", info);
        }
        Ok(Self::with_adapter(adapter))
    }

    /// Use a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            known: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn find(&self, id: &PeripheralId) -> Result<BtlePeripheral> {
        if let Some(peripheral) = self.known.read().await.get(id) {
            return Ok(peripheral.clone());
        }

        // Not seen through the event stream yet; search the adapter's list.
        for peripheral in self.adapter.peripherals().await? {
            if let Ok(Some(props)) = peripheral.properties().await {
                let identifier = create_identifier(&props.address.to_string(), &peripheral.id());
                if identifier == *id {
                    debug!("Matched {} in adapter peripheral list", id);
                    self.known
                        .write()
                        .await
                        .insert(identifier, peripheral.clone());
                    return Ok(peripheral);
                }
            }
        }
        Err(Error::PeripheralNotFound(id.to_string()))
    }
}

/// Map the platform adapter state. btleplug distinguishes fewer states.
fn map_state(state: CentralState) -> AdapterState {
    match state {
        CentralState::PoweredOn => AdapterState::PoweredOn,
        CentralState::PoweredOff => AdapterState::PoweredOff,
        _ => AdapterState::Unknown,
    }
}

/// Build an advertisement snapshot from cached peripheral properties.
fn advertisement_from_properties(props: &PeripheralProperties) -> Advertisement {
    Advertisement {
        local_name: props.local_name.clone(),
        service_uuids: props.services.clone(),
        manufacturer_data: props
            .manufacturer_data
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect(),
        service_data: props
            .service_data
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect(),
        tx_power_level: props.tx_power_level,
    }
}

fn convert_service(service: &btleplug::api::Service) -> Service {
    Service {
        uuid: service.uuid,
        primary: service.primary,
        characteristics: service.characteristics.iter().map(|c| c.uuid).collect(),
    }
}

/// Resolve a platform event into a notification, caching the peripheral.
async fn translate(adapter: &Adapter, known: &PeripheralCache, event: BtleEvent) -> Option<TransportEvent> {
    match event {
        BtleEvent::StateUpdate(state) => Some(TransportEvent::StateChange(map_state(state))),
        BtleEvent::DeviceDiscovered(pid) | BtleEvent::DeviceUpdated(pid) => {
            let peripheral = adapter.peripheral(&pid).await.ok()?;
            let props = peripheral.properties().await.ok()??;
            let id = create_identifier(&props.address.to_string(), &peripheral.id());
            known.write().await.insert(id.clone(), peripheral);
            Some(TransportEvent::Advertisement(AdvertisementReport {
                id,
                advertisement: advertisement_from_properties(&props),
                rssi: props.rssi,
            }))
        }
        BtleEvent::DeviceDisconnected(pid) => {
            let peripheral = adapter.peripheral(&pid).await.ok()?;
            let props = peripheral.properties().await.ok()??;
            let id = create_identifier(&props.address.to_string(), &peripheral.id());
            // btleplug does not report why a link went down.
            Some(TransportEvent::Disconnected {
                id,
                reason: DisconnectReason::Unknown,
            })
        }
        _ => None,
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    async fn adapter_state(&self) -> Result<AdapterState> {
        Ok(map_state(self.adapter.adapter_state().await?))
    }

    async fn notifications(&self) -> Result<NotificationStream> {
        let events = self.adapter.events().await?;
        let adapter = self.adapter.clone();
        let known = Arc::clone(&self.known);
        let stream = events.filter_map(move |event| {
            let adapter = adapter.clone();
            let known = Arc::clone(&known);
            async move { translate(&adapter, &known, event).await }
        });
        Ok(stream.boxed())
    }

    async fn start_scan(&self, options: &ScanOptions) -> Result<()> {
        let filter = ScanFilter {
            services: options.service_uuids.clone(),
        };
        self.adapter.start_scan(filter).await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, id: &PeripheralId) -> Result<()> {
        let peripheral = self.find(id).await?;
        peripheral.connect().await?;
        Ok(())
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<bool> {
        let peripheral = self.find(id).await?;
        let was_connected = peripheral.is_connected().await?;
        if let Err(e) = peripheral.disconnect().await {
            warn!("Error disconnecting {}: {}", id, e);
            return Err(e.into());
        }
        Ok(was_connected)
    }

    async fn read_rssi(&self, id: &PeripheralId) -> Result<i16> {
        let peripheral = self.find(id).await?;
        peripheral
            .properties()
            .await?
            .and_then(|p| p.rssi)
            .ok_or_else(|| Error::transport("RSSI not available"))
    }

    async fn discover_services(&self, id: &PeripheralId, _filter: &[Uuid]) -> Result<Vec<Service>> {
        let peripheral = self.find(id).await?;
        peripheral.discover_services().await?;
        Ok(peripheral.services().iter().map(convert_service).collect())
    }
}
