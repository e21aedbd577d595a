//! Hardware integration tests for bluecentral-core
//!
//! These tests require actual BLE hardware and should be run with:
//! ```
//! cargo test --package bluecentral-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Configure the target peripheral via environment variable:
//! - `BLUECENTRAL_DEVICE`: address (or CoreBluetooth UUID on macOS) of a
//!   connectable peripheral in range
//!
//! Example:
//! ```
//! BLUECENTRAL_DEVICE="C0:11:22:33:44:55" cargo test --package bluecentral-core --test hardware_tests -- --ignored --nocapture
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use bluecentral_core::events::names;
use bluecentral_core::{
    AdapterState, BtleplugTransport, Central, CentralConfig, CentralEvent, ConnectionState,
    PeripheralEvent, PeripheralId, ScanOptions,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Default timeout for BLE operations
const BLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Get the target peripheral from environment
fn get_device() -> Option<PeripheralId> {
    env::var("BLUECENTRAL_DEVICE")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PeripheralId::new)
}

async fn start_central() -> Central {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let transport = BtleplugTransport::new()
        .await
        .expect("No Bluetooth adapter available");
    let central = Central::new(Arc::new(transport), CentralConfig::challenging_environment())
        .expect("valid config");

    let (tx, mut rx) = mpsc::unbounded_channel();
    central.on(names::STATE_CHANGE, move |_, event| {
        if let CentralEvent::StateChange { state } = event {
            let _ = tx.send(*state);
        }
    });
    central.start().await.expect("start failed");

    let powered = timeout(BLE_TIMEOUT, async {
        while let Some(state) = rx.recv().await {
            if state == AdapterState::PoweredOn {
                return true;
            }
        }
        false
    })
    .await;
    assert!(
        matches!(powered, Ok(true)),
        "Adapter did not report poweredOn"
    );
    central
}

// =============================================================================
// Scan Tests
// =============================================================================

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_discovers_peripherals() {
    let central = start_central().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    central.on(names::PERIPHERAL_DISCOVER, move |_, event| {
        if let CentralEvent::PeripheralDiscover {
            peripheral, rssi, ..
        } = event
        {
            let _ = tx.send((peripheral.id().clone(), *rssi));
        }
    });
    central.start_scanning(ScanOptions::default()).unwrap();

    let first = timeout(BLE_TIMEOUT, rx.recv()).await;
    central.stop_scanning().unwrap();
    let (id, rssi) = first
        .expect("No peripheral discovered within timeout")
        .expect("event channel closed");
    println!("Discovered {} (RSSI: {:?})", id, rssi);

    assert!(central.peripheral(&id).is_some());
    central.shutdown().await;
}

// =============================================================================
// Session Tests
// =============================================================================

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_connect_rssi_services_disconnect() {
    let Some(target) = get_device() else {
        println!("Set BLUECENTRAL_DEVICE to run this test");
        return;
    };
    let central = start_central().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    {
        let target = target.clone();
        central.on(names::PERIPHERAL_DISCOVER, move |central, event| {
            if let CentralEvent::PeripheralDiscover { peripheral, .. } = event
                && *peripheral.id() == target
            {
                let _ = central.stop_scanning();
                let _ = tx.send(peripheral.clone());
            }
        });
    }
    central.start_scanning(ScanOptions::default()).unwrap();
    let peripheral = timeout(BLE_TIMEOUT, rx.recv())
        .await
        .expect("Target not discovered within timeout")
        .expect("event channel closed");

    let (tx, mut events) = mpsc::unbounded_channel();
    for name in [
        names::CONNECT,
        names::CONNECT_FAILURE,
        names::RSSI_UPDATE,
        names::RSSI_UPDATE_FAILURE,
        names::SERVICES_DISCOVER,
        names::SERVICES_DISCOVER_FAILURE,
        names::DISCONNECT,
    ] {
        let tx = tx.clone();
        peripheral.on(name, move |_, event| {
            let _ = tx.send(event.clone());
        });
    }

    peripheral.connect().unwrap();
    let event = timeout(BLE_TIMEOUT, events.recv()).await.unwrap().unwrap();
    assert!(
        matches!(event, PeripheralEvent::Connect),
        "connect failed: {:?}",
        event
    );

    peripheral.update_rssi().unwrap();
    let event = timeout(BLE_TIMEOUT, events.recv()).await.unwrap().unwrap();
    println!("RSSI event: {:?}", event);

    peripheral.discover_services(&[]).unwrap();
    let event = timeout(BLE_TIMEOUT, events.recv()).await.unwrap().unwrap();
    if let PeripheralEvent::ServicesDiscover { services } = &event {
        for service in services {
            println!("Service {} ({} characteristics)", service, service.characteristics.len());
        }
    } else {
        panic!("service discovery failed: {:?}", event);
    }

    peripheral.disconnect().unwrap();
    let event = timeout(BLE_TIMEOUT, events.recv()).await.unwrap().unwrap();
    assert!(matches!(event, PeripheralEvent::Disconnect { .. }));
    assert_eq!(peripheral.state(), ConnectionState::Disconnected);

    central.shutdown().await;
}
