//! Opening a session manager over real hardware or a simulated radio.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bluecentral_core::uuids::{
    BATTERY_LEVEL, BATTERY_SERVICE, DEVICE_INFO_SERVICE, DEVICE_NAME, GAP_SERVICE,
    HEART_RATE_SERVICE, MANUFACTURER_NAME,
};
use bluecentral_core::{
    Advertisement, BtleplugTransport, Central, CentralConfig, MockPeripheral, MockTransport,
    PeripheralId, Service,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// How often simulated peripherals advertise.
const ADVERTISING_INTERVAL: Duration = Duration::from_millis(250);

/// Simulated peripherals: address, base RSSI.
const SIMULATED: [(&str, i16); 3] = [
    ("C0:FF:EE:00:00:01", -58),
    ("C0:FF:EE:00:00:02", -71),
    ("C0:FF:EE:00:00:03", -88),
];

/// A session manager plus whatever keeps its radio alive.
pub struct Radio {
    pub central: Central,
    advertiser: Option<JoinHandle<()>>,
}

impl Radio {
    /// Open the first Bluetooth adapter, or a simulated radio.
    pub async fn open(simulate: bool, config: CentralConfig) -> Result<Self> {
        if simulate {
            info!("Using simulated radio");
            let transport = Arc::new(simulated_transport());
            let advertiser = tokio::spawn(advertise(Arc::clone(&transport)));
            let central = Central::new(transport, config)?;
            return Ok(Self {
                central,
                advertiser: Some(advertiser),
            });
        }

        let transport = BtleplugTransport::new()
            .await
            .context("Failed to open Bluetooth adapter")?;
        let central = Central::new(Arc::new(transport), config)?;
        Ok(Self {
            central,
            advertiser: None,
        })
    }

    /// Stop the session manager and the simulated advertiser, if any.
    pub async fn close(mut self) {
        self.central.shutdown().await;
        if let Some(advertiser) = self.advertiser.take() {
            advertiser.abort();
        }
    }
}

/// A mock radio with a heart-rate monitor, a battery-powered sensor and a
/// far-away beacon that refuses connections.
pub fn simulated_transport() -> MockTransport {
    let transport = MockTransport::new();
    transport.set_connect_latency(Duration::from_millis(150));
    transport.set_latency(Duration::from_millis(40));

    let [(monitor, monitor_rssi), (sensor, sensor_rssi), (beacon, beacon_rssi)] = SIMULATED;
    transport.add_peripheral(
        MockPeripheral::new(monitor)
            .advertisement(
                Advertisement::new()
                    .with_local_name("Heart Monitor")
                    .with_service(HEART_RATE_SERVICE)
                    .with_tx_power_level(4),
            )
            .rssi(monitor_rssi)
            .service(Service::new(GAP_SERVICE).with_characteristic(DEVICE_NAME))
            .service(Service::new(HEART_RATE_SERVICE))
            .service(Service::new(BATTERY_SERVICE).with_characteristic(BATTERY_LEVEL)),
    );
    transport.add_peripheral(
        MockPeripheral::new(sensor)
            .advertisement(
                Advertisement::new()
                    .with_local_name("Env Sensor")
                    .with_service(BATTERY_SERVICE)
                    .with_manufacturer_data(0xFFFF, [0x01, 0x02]),
            )
            .rssi(sensor_rssi)
            .service(Service::new(DEVICE_INFO_SERVICE).with_characteristic(MANUFACTURER_NAME))
            .service(Service::new(BATTERY_SERVICE).with_characteristic(BATTERY_LEVEL)),
    );
    transport.add_peripheral(
        MockPeripheral::new(beacon)
            .advertisement(Advertisement::new().with_manufacturer_data(0x004C, [0x02, 0x15]))
            .rssi(beacon_rssi)
            .non_connectable(),
    );
    transport
}

/// Advertise every simulated peripheral periodically with a jittered RSSI.
async fn advertise(transport: Arc<MockTransport>) {
    let mut ticker = tokio::time::interval(ADVERTISING_INTERVAL);
    loop {
        ticker.tick().await;
        for (address, base) in SIMULATED {
            transport.set_rssi(&PeripheralId::new(address), base + rand::random_range(-3..=3));
        }
        let sent = transport.advertise_all();
        if sent > 0 {
            debug!("Simulated radio sent {} advertisement(s)", sent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_world() {
        let transport = simulated_transport();
        // Nothing is heard until a scan starts.
        assert_eq!(transport.advertise_all(), 0);
        assert!(!transport.is_scanning());
    }

    #[tokio::test]
    async fn test_simulated_radio_opens() {
        let radio = Radio::open(true, CentralConfig::default()).await.unwrap();
        radio.central.start().await.unwrap();
        assert!(radio.central.peripherals().is_empty());
        radio.close().await;
    }
}
