//! Bluetooth UUID constants and conversions.
//!
//! Services and characteristics defined by the Bluetooth SIG are usually
//! written in their 16-bit short form (`180f`), which is an alias for a
//! 128-bit UUID built on the Bluetooth base UUID. This module converts
//! between the two forms and parses the textual variants found in
//! configuration files and on the command line.

use uuid::Uuid;

use crate::error::{ParseError, ParseResult};

/// The Bluetooth base UUID (`00000000-0000-1000-8000-00805f9b34fb`).
pub const BLUETOOTH_BASE_UUID: Uuid = Uuid::from_u128(BASE_UUID_BITS);

const BASE_UUID_BITS: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;
const SHORT_MASK: u128 = 0xFFFF_FFFF << 96;

// --- Standard BLE Service UUIDs ---

/// Generic Access Profile (GAP) service.
pub const GAP_SERVICE: Uuid = from_short(0x1800);

/// Generic Attribute Profile (GATT) service.
pub const GATT_SERVICE: Uuid = from_short(0x1801);

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = from_short(0x180A);

/// Battery service.
pub const BATTERY_SERVICE: Uuid = from_short(0x180F);

/// Heart Rate service.
pub const HEART_RATE_SERVICE: Uuid = from_short(0x180D);

// --- Standard BLE Characteristic UUIDs ---

/// Device name characteristic.
pub const DEVICE_NAME: Uuid = from_short(0x2A00);

/// Battery level characteristic.
pub const BATTERY_LEVEL: Uuid = from_short(0x2A19);

/// Manufacturer name string characteristic.
pub const MANUFACTURER_NAME: Uuid = from_short(0x2A29);

/// Expand a 16-bit SIG-assigned UUID to its 128-bit form.
#[must_use]
pub const fn from_short(short: u16) -> Uuid {
    from_u32(short as u32)
}

/// Expand a 32-bit SIG-assigned UUID to its 128-bit form.
#[must_use]
pub const fn from_u32(value: u32) -> Uuid {
    Uuid::from_u128(BASE_UUID_BITS | ((value as u128) << 96))
}

/// Return the 16-bit alias of a UUID, if it is built on the base UUID.
///
/// ```
/// use bluecentral_types::uuid::{BATTERY_SERVICE, to_short};
///
/// assert_eq!(to_short(&BATTERY_SERVICE), Some(0x180F));
/// assert_eq!(to_short(&uuid::Uuid::nil()), None);
/// ```
#[must_use]
pub fn to_short(uuid: &Uuid) -> Option<u16> {
    let bits = uuid.as_u128();
    if bits & !SHORT_MASK != BASE_UUID_BITS {
        return None;
    }
    u16::try_from(bits >> 96).ok()
}

/// Render a UUID compactly: four hex digits for 16-bit aliases, otherwise
/// the 32-digit form without hyphens.
#[must_use]
pub fn short_string(uuid: &Uuid) -> String {
    match to_short(uuid) {
        Some(short) => format!("{short:04x}"),
        None => uuid.simple().to_string(),
    }
}

/// Parse a UUID in any of the common textual forms.
///
/// Accepted inputs: `180f`, `0x180F`, 8-digit 32-bit aliases,
/// 32 hex digits without hyphens, and the hyphenated 128-bit form.
///
/// ```
/// use bluecentral_types::uuid::{parse_uuid, BATTERY_SERVICE};
///
/// assert_eq!(parse_uuid("180f").unwrap(), BATTERY_SERVICE);
/// assert_eq!(parse_uuid("0x180F").unwrap(), BATTERY_SERVICE);
/// assert_eq!(parse_uuid("0000180f-0000-1000-8000-00805f9b34fb").unwrap(), BATTERY_SERVICE);
/// ```
pub fn parse_uuid(input: &str) -> ParseResult<Uuid> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let invalid = || ParseError::InvalidUuid(input.to_string());

    match digits.len() {
        4 => u16::from_str_radix(digits, 16)
            .map(from_short)
            .map_err(|_| invalid()),
        8 => u32::from_str_radix(digits, 16)
            .map(from_u32)
            .map_err(|_| invalid()),
        _ => Uuid::parse_str(digits).map_err(|_| invalid()),
    }
}
