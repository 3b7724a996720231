//! btleplug-backed discovery and the production [`Transport`] implementation.
//!
//! This is the only module that touches the platform BLE stack; everything
//! above it works against the [`Transport`] trait.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::reader::{NotificationStream, Transport};
use crate::types::DeviceDescriptor;

/// A BLE peripheral found during a scan, paired with its descriptor.
///
/// Hand [`DiscoveredDevice::transport`] to
/// [`crate::registry::Registry::create_reader`] to bind a reader to it.
pub struct DiscoveredDevice {
    pub descriptor: DeviceDescriptor,
    peripheral: Peripheral,
}

impl DiscoveredDevice {
    /// A fresh transport handle for this peripheral. Exactly one reader may
    /// own it.
    pub fn transport(&self) -> BleTransport {
        BleTransport::new(self.peripheral.clone())
    }
}

/// Scan the first available adapter for `duration` and return every named
/// peripheral. Peripherals that advertise no local name are skipped — an
/// unnamed device can never match a family predicate anyway.
pub async fn scan(duration: Duration) -> Result<Vec<DiscoveredDevice>> {
    let manager = Manager::new().await?;
    let adapter = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or(Error::NoAdapter)?;

    // macOS: CBCentralManager needs a moment to reach poweredOn after
    // initialisation; scanning before that is a silent no-op.
    #[cfg(target_os = "macos")]
    tokio::time::sleep(Duration::from_millis(500)).await;

    info!("scanning for {} s …", duration.as_secs());
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;
    adapter.stop_scan().await.ok();

    let mut found = Vec::new();
    for peripheral in adapter.peripherals().await? {
        let Ok(Some(properties)) = peripheral.properties().await else {
            continue;
        };
        let Some(name) = properties.local_name else {
            continue;
        };
        let address = peripheral.id().to_string();
        debug!("scan: found {name} ({address})");
        found.push(DiscoveredDevice {
            descriptor: DeviceDescriptor { name, address },
            peripheral,
        });
    }
    info!("scan: {} named device(s) found", found.len());
    Ok(found)
}

/// [`Transport`] over a btleplug [`Peripheral`].
///
/// The GATT characteristic set is cached at connect time (after service
/// discovery); characteristic lookups before `connect` fail with
/// [`Error::CharacteristicNotFound`].
pub struct BleTransport {
    peripheral: Peripheral,
    characteristics: BTreeSet<Characteristic>,
}

impl BleTransport {
    pub fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            characteristics: BTreeSet::new(),
        }
    }

    fn find_char(&self, uuid: Uuid) -> Result<Characteristic> {
        self.characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or(Error::CharacteristicNotFound(uuid))
    }
}

#[async_trait]
impl Transport for BleTransport {
    /// Connect and discover services, both under hard timeouts — BlueZ's
    /// `Connect` can block indefinitely when the device is out of range.
    async fn connect(&mut self) -> Result<()> {
        tokio::time::timeout(Duration::from_secs(10), self.peripheral.connect())
            .await
            .map_err(|_| Error::Timeout("connect"))??;

        // BlueZ signals connection completion before the GATT cache is
        // populated; discovering too early yields an empty characteristic set.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        tokio::time::timeout(Duration::from_secs(15), self.peripheral.discover_services())
            .await
            .map_err(|_| Error::Timeout("discover_services"))??;

        self.characteristics = self.peripheral.characteristics();
        debug!(
            "connected, {} characteristic(s) discovered",
            self.characteristics.len()
        );
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.peripheral.disconnect().await?;
        self.characteristics.clear();
        Ok(())
    }

    async fn read(&mut self, characteristic: Uuid) -> Result<Vec<u8>> {
        let c = self.find_char(characteristic)?;
        Ok(self.peripheral.read(&c).await?)
    }

    async fn write(&mut self, characteristic: Uuid, payload: &[u8]) -> Result<()> {
        let c = self.find_char(characteristic)?;
        Ok(self
            .peripheral
            .write(&c, payload, WriteType::WithResponse)
            .await?)
    }

    async fn subscribe(&mut self, characteristic: Uuid) -> Result<()> {
        let c = self.find_char(characteristic)?;
        Ok(self.peripheral.subscribe(&c).await?)
    }

    async fn unsubscribe(&mut self, characteristic: Uuid) -> Result<()> {
        let c = self.find_char(characteristic)?;
        Ok(self.peripheral.unsubscribe(&c).await?)
    }

    async fn notifications(&mut self) -> Result<NotificationStream> {
        let stream = self.peripheral.notifications().await?;
        Ok(Box::pin(stream.map(|n| (n.uuid, n.value))))
    }
}
