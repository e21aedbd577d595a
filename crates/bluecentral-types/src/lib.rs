//! Platform-agnostic types for the bluecentral BLE central session manager.
//!
//! This crate provides the value types shared by the session manager
//! (bluecentral-core), its radio transports and front ends.
//!
//! # Features
//!
//! - Adapter and connection state enums with their conventional names
//! - Peripheral identity and advertisement payloads
//! - Discovered GATT services
//! - Bluetooth UUID helpers (16-bit aliases, lenient parsing)
//! - Error types for parsing
//!
//! # Example
//!
//! ```
//! use bluecentral_types::{AdapterState, Advertisement, PeripheralId};
//! use bluecentral_types::uuid::BATTERY_SERVICE;
//!
//! let state: AdapterState = "poweredOn".parse().unwrap();
//! assert!(state.is_powered_on());
//!
//! let id: PeripheralId = "aa:bb:cc:dd:ee:ff".parse().unwrap();
//! assert_eq!(id.as_str(), "AA:BB:CC:DD:EE:FF");
//!
//! let adv = Advertisement::new().with_local_name("Thermo").with_service(BATTERY_SERVICE);
//! assert!(adv.advertises_any(&[BATTERY_SERVICE]));
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{AdapterState, Advertisement, ConnectionState, PeripheralId, Service};
pub use crate::uuid as uuids;
