//! Utility functions for bluecentral-core.
//!
//! This module contains shared utility functions used across the crate.

use std::future::Future;
use std::time::Duration;

use btleplug::platform::PeripheralId as BtlePeripheralId;

use bluecentral_types::PeripheralId;

use crate::error::{Error, Result};

/// Address reported by CoreBluetooth, which hides real addresses.
const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a btleplug peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they may be
/// MAC addresses or other formats. This function extracts the useful
/// identifier string.
pub fn format_peripheral_id(id: &BtlePeripheralId) -> String {
    strip_debug_wrapper(&format!("{:?}", id))
}

fn strip_debug_wrapper(debug: &str) -> String {
    debug
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Create a session identity from an address and a btleplug peripheral ID.
///
/// On macOS where addresses are 00:00:00:00:00:00, uses the peripheral ID.
/// On other platforms, uses the Bluetooth address.
pub fn create_identifier(address: &str, peripheral_id: &BtlePeripheralId) -> PeripheralId {
    identifier_from_parts(address, || format_peripheral_id(peripheral_id))
}

fn identifier_from_parts(address: &str, platform_id: impl FnOnce() -> String) -> PeripheralId {
    if address == HIDDEN_ADDRESS {
        PeripheralId::new(platform_id())
    } else {
        PeripheralId::new(address)
    }
}

/// Run `future`, failing with [`Error::Timeout`] if it does not finish
/// within `duration`.
pub async fn with_timeout<T, F>(operation: &str, duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| Error::timeout(operation, duration))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_uses_address() {
        let id = identifier_from_parts("aa:bb:cc:dd:ee:ff", || unreachable!());
        assert_eq!(id.as_str(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_identifier_falls_back_to_platform_id() {
        let id = identifier_from_parts(HIDDEN_ADDRESS, || {
            "1f2e3d4c-0000-1111-2222-333344445555".to_string()
        });
        assert_eq!(id.as_str(), "1F2E3D4C-0000-1111-2222-333344445555");
    }

    #[test]
    fn test_strip_debug_wrapper() {
        assert_eq!(strip_debug_wrapper("PeripheralId(hci0/dev_AA)"), "hci0/dev_AA");
        assert_eq!(strip_debug_wrapper("plain"), "plain");
    }

    #[tokio::test]
    async fn test_with_timeout_passes_through() {
        let value = with_timeout("noop", Duration::from_secs(1), async { Ok(5) })
            .await
            .unwrap();
        assert_eq!(value, 5);

        let err = with_timeout::<(), _>("fail", Duration::from_secs(1), async {
            Err(Error::NotConnected)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_expires() {
        let err = with_timeout("connect", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout { ref operation, .. } if operation == "connect"));
    }
}
