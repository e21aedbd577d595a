//! BLE central session manager.
//!
//! This crate drives the central role of Bluetooth Low Energy: it tracks the
//! adapter state, scans for peripherals, connects to them, reads their
//! signal strength, enumerates their services and disconnects, delivering
//! every step as a named event in a well-defined order.
//!
//! # Features
//!
//! - **Adapter gating**: scans and connects are refused unless the adapter is `poweredOn`
//! - **Scan control**: service filters, per-session de-duplication, restart with new filters
//! - **Peripheral sessions**: one state machine per peripheral, stale completions discarded
//! - **Two event sinks**: unqualified events on the peripheral, qualified events on the central
//! - **Pluggable radio**: [`BtleplugTransport`] for hardware, [`MockTransport`] for tests
//!
//! # Event Order
//!
//! All events are emitted from one driver task. Events for one peripheral
//! arrive in the order its transitions happened; a peripheral's local event
//! (`connect`) always precedes the global one (`peripheralConnect`).
//! `stateChange` is ordered with respect to every other event.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use bluecentral_core::events::{names, CentralEvent, PeripheralEvent};
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
//!
//!     central.once(names::PERIPHERAL_DISCOVER, |central, event| {
//!         let CentralEvent::PeripheralDiscover { peripheral, .. } = event else {
//!             return;
//!         };
//!         let _ = central.stop_scanning();
//!         peripheral.on(names::CONNECT, |peripheral, _| {
//!             let _ = peripheral.update_rssi();
//!         });
//!         peripheral.on(names::RSSI_UPDATE, |peripheral, event| {
//!             if let PeripheralEvent::RssiUpdate { rssi } = event {
//!                 println!("RSSI: {} dBm", rssi);
//!             }
//!             let _ = peripheral.disconnect();
//!         });
//!         let _ = peripheral.connect();
//!     });
//!
//!     central.start().await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!     central.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod btle;
pub mod central;
pub mod config;
pub mod error;
pub mod events;
pub mod mock;
pub mod peripheral;
pub mod scan;
pub mod transport;
pub mod util;

// Re-export types and uuid modules from bluecentral-types
pub use bluecentral_types::types;
pub use bluecentral_types::uuids;

// Core exports
pub use btle::BtleplugTransport;
pub use central::Central;
pub use config::CentralConfig;
pub use error::{ConnectionFailureReason, Error, Result};
pub use events::{CentralEvent, DisconnectReason, EventEmitter, ListenerId, PeripheralEvent};
pub use mock::{MockPeripheral, MockTransport};
pub use peripheral::Peripheral;
pub use scan::{ScanOptions, ScanState};
pub use transport::{AdvertisementReport, NotificationStream, Transport, TransportEvent};
pub use util::{create_identifier, format_peripheral_id};

// Re-export from bluecentral-types
pub use bluecentral_types::{AdapterState, Advertisement, ConnectionState, PeripheralId, Service};
