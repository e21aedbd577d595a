//! Core value types shared by the session manager and its transports.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ParseError;

/// Power and availability state of the local Bluetooth adapter.
///
/// `Display` and `FromStr` use the conventional camelCase names
/// (`"poweredOn"`, `"poweredOff"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum AdapterState {
    /// No state has been reported yet.
    #[default]
    Unknown,
    /// The adapter is resetting.
    Resetting,
    /// The platform has no BLE central support.
    Unsupported,
    /// The process is not allowed to use Bluetooth.
    Unauthorized,
    /// The radio is switched off.
    PoweredOff,
    /// The radio is on and usable.
    PoweredOn,
}

impl AdapterState {
    /// All states, in declaration order.
    pub const ALL: [AdapterState; 6] = [
        AdapterState::Unknown,
        AdapterState::Resetting,
        AdapterState::Unsupported,
        AdapterState::Unauthorized,
        AdapterState::PoweredOff,
        AdapterState::PoweredOn,
    ];

    /// Whether radio operations may be issued in this state.
    #[must_use]
    pub fn is_powered_on(self) -> bool {
        self == AdapterState::PoweredOn
    }

    /// The camelCase name of this state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterState::Unknown => "unknown",
            AdapterState::Resetting => "resetting",
            AdapterState::Unsupported => "unsupported",
            AdapterState::Unauthorized => "unauthorized",
            AdapterState::PoweredOff => "poweredOff",
            AdapterState::PoweredOn => "poweredOn",
        }
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterState {
    type Err = ParseError;

    /// Parse a state name. Matching ignores case, so `"poweredon"` and
    /// `"POWEREDON"` are accepted as well.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParseError::InvalidAdapterState(s.to_string()))
    }
}

/// Connection state of a peripheral session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum ConnectionState {
    /// No link. The initial state, and the state after any disconnect.
    #[default]
    Disconnected,
    /// A connect request is outstanding.
    Connecting,
    /// The link is up.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Identity of a remote peripheral.
///
/// On Linux and Windows this is the Bluetooth address (`AA:BB:CC:DD:EE:FF`);
/// on macOS CoreBluetooth hides addresses and a per-host UUID is used
/// instead. Identifiers are stored upper-cased so that comparisons are
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PeripheralId(String);

impl PeripheralId {
    /// Create an identifier without validation. Transports use this for
    /// identifiers that come straight from the platform stack.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_ascii_uppercase())
    }

    /// The normalized identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identifier has the shape of a 48-bit Bluetooth address.
    #[must_use]
    pub fn is_address(&self) -> bool {
        let parts: Vec<&str> = self.0.split(':').collect();
        parts.len() == 6
            && parts
                .iter()
                .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeripheralId {
    type Err = ParseError;

    /// Parse a user-supplied identifier. Only hex digits, `:` and `-`
    /// are allowed, which covers both addresses and platform UUIDs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseError::InvalidPeripheralId {
                value: s.to_string(),
                reason: "identifier is empty",
            });
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == ':' || c == '-')
        {
            return Err(ParseError::InvalidPeripheralId {
                value: s.to_string(),
                reason: "only hex digits, ':' and '-' are allowed",
            });
        }
        if !trimmed.chars().any(|c| c.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidPeripheralId {
                value: s.to_string(),
                reason: "identifier has no hex digits",
            });
        }
        Ok(Self::new(trimmed))
    }
}

impl From<&str> for PeripheralId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Payload of a BLE advertisement (and scan response) as seen by the core.
///
/// RSSI is deliberately not part of this type: two packets with the same
/// payload compare equal even if their signal strength differs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Advertisement {
    /// Complete or shortened local name.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    pub local_name: Option<String>,
    /// Advertised service UUIDs, in packet order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub service_uuids: Vec<Uuid>,
    /// Manufacturer-specific data keyed by company identifier.
    #[cfg_attr(feature = "serde", serde(default))]
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
    /// Service data keyed by service UUID.
    #[cfg_attr(feature = "serde", serde(default))]
    pub service_data: BTreeMap<Uuid, Vec<u8>>,
    /// Advertised transmit power in dBm.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    pub tx_power_level: Option<i16>,
}

impl Advertisement {
    /// Create an empty advertisement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the local name.
    #[must_use]
    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    /// Add an advertised service UUID.
    #[must_use]
    pub fn with_service(mut self, uuid: Uuid) -> Self {
        self.service_uuids.push(uuid);
        self
    }

    /// Add manufacturer data for a company identifier.
    #[must_use]
    pub fn with_manufacturer_data(mut self, company_id: u16, data: impl Into<Vec<u8>>) -> Self {
        self.manufacturer_data.insert(company_id, data.into());
        self
    }

    /// Add service data.
    #[must_use]
    pub fn with_service_data(mut self, uuid: Uuid, data: impl Into<Vec<u8>>) -> Self {
        self.service_data.insert(uuid, data.into());
        self
    }

    /// Set the advertised TX power.
    #[must_use]
    pub fn with_tx_power_level(mut self, dbm: i16) -> Self {
        self.tx_power_level = Some(dbm);
        self
    }

    /// Whether this advertisement names any of `uuids`, either as an
    /// advertised service or as a service-data key.
    ///
    /// An empty `uuids` slice matches every advertisement.
    #[must_use]
    pub fn advertises_any(&self, uuids: &[Uuid]) -> bool {
        uuids.is_empty()
            || uuids
                .iter()
                .any(|u| self.service_uuids.contains(u) || self.service_data.contains_key(u))
    }
}

/// A GATT service discovered on a connected peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Service {
    /// Service UUID.
    pub uuid: Uuid,
    /// Whether this is a primary service.
    pub primary: bool,
    /// Characteristic UUIDs, in discovery order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub characteristics: Vec<Uuid>,
}

impl Service {
    /// Create a primary service without characteristics.
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            primary: true,
            characteristics: Vec::new(),
        }
    }

    /// Add a characteristic UUID.
    #[must_use]
    pub fn with_characteristic(mut self, uuid: Uuid) -> Self {
        self.characteristics.push(uuid);
        self
    }

    /// Mark the service as secondary.
    #[must_use]
    pub fn secondary(mut self) -> Self {
        self.primary = false;
        self
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::uuid::short_string(&self.uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uuid::{BATTERY_SERVICE, HEART_RATE_SERVICE};

    #[test]
    fn test_adapter_state_default_is_unknown() {
        assert_eq!(AdapterState::default(), AdapterState::Unknown);
    }

    #[test]
    fn test_adapter_state_display_and_parse() {
        for state in AdapterState::ALL {
            let text = state.to_string();
            assert_eq!(text.parse::<AdapterState>().unwrap(), state);
        }
        assert_eq!(AdapterState::PoweredOn.to_string(), "poweredOn");
        assert_eq!(
            "POWEREDOFF".parse::<AdapterState>().unwrap(),
            AdapterState::PoweredOff
        );
    }

    #[test]
    fn test_adapter_state_parse_unknown_name() {
        let err = "sleeping".parse::<AdapterState>().unwrap_err();
        assert_eq!(err, ParseError::InvalidAdapterState("sleeping".to_string()));
    }

    #[test]
    fn test_only_powered_on_is_ready() {
        let ready: Vec<_> = AdapterState::ALL
            .into_iter()
            .filter(|s| s.is_powered_on())
            .collect();
        assert_eq!(ready, vec![AdapterState::PoweredOn]);
    }

    #[test]
    fn test_peripheral_id_is_case_insensitive() {
        assert_eq!(PeripheralId::new("aa:bb"), PeripheralId::new("AA:BB"));
        assert_eq!(PeripheralId::new(" aa:bb ").as_str(), "AA:BB");
    }

    #[test]
    fn test_peripheral_id_parse() {
        let id: PeripheralId = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert!(id.is_address());
        let id: PeripheralId = "1f2e3d4c-0000-1111-2222-333344445555".parse().unwrap();
        assert!(!id.is_address());
        assert!("".parse::<PeripheralId>().is_err());
        assert!("Living Room".parse::<PeripheralId>().is_err());
        assert!("::".parse::<PeripheralId>().is_err());
    }

    #[test]
    fn test_advertisement_equality() {
        let a = Advertisement::new().with_local_name("Sensor");
        let b = Advertisement::new().with_local_name("Sensor");
        assert_eq!(a, b);
        let c = b.clone().with_manufacturer_data(0x004C, vec![1, 2]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_advertises_any() {
        let adv = Advertisement::new()
            .with_service(HEART_RATE_SERVICE)
            .with_service_data(BATTERY_SERVICE, vec![80]);
        assert!(adv.advertises_any(&[]));
        assert!(adv.advertises_any(&[HEART_RATE_SERVICE]));
        assert!(adv.advertises_any(&[BATTERY_SERVICE]));
        assert!(!adv.advertises_any(&[crate::uuid::GAP_SERVICE]));
    }

    #[test]
    fn test_service_display_uses_short_form() {
        let service = Service::new(BATTERY_SERVICE);
        assert_eq!(service.to_string(), "180f");
        assert!(service.primary);
        assert!(!service.secondary().primary);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_adapter_state_serde_names() {
        let json = serde_json::to_string(&AdapterState::PoweredOff).unwrap();
        assert_eq!(json, "\"poweredOff\"");
        let state: AdapterState = serde_json::from_str("\"poweredOn\"").unwrap();
        assert_eq!(state, AdapterState::PoweredOn);
    }
}
