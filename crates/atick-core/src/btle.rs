//! btleplug-backed transport.
//!
//! [`BtleTransport`] wraps a discovered peripheral. Each connect discovers
//! services and caches characteristics by `(service, characteristic)` so
//! reads and writes are O(1) lookups. Every GATT operation is bounded by
//! [`ConnectionConfig::operation_timeout`].
//!
//! A connect that fails or is dropped after the peripheral connected
//! disconnects it again, so the device is never left half-open and keeps
//! advertising.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::runtime::Handle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connection::ConnectionConfig;
use crate::error::{Error, Result};
use crate::transport::{GattLink, Transport};

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or_else(|| Error::transport("No Bluetooth adapter available"))
}

/// Search known peripherals for one with the given MAC address.
async fn find_peripheral(adapter: &Adapter, address: &str) -> Result<Option<Peripheral>> {
    let wanted = address.to_lowercase();
    for peripheral in adapter.peripherals().await? {
        if let Ok(Some(props)) = peripheral.properties().await
            && props.address.to_string().to_lowercase() == wanted
        {
            debug!("Matched by address: {}", props.address);
            return Ok(Some(peripheral));
        }
    }
    Ok(None)
}

/// Disconnects the peripheral unless the connect attempt completed.
struct PendingConnect<'a> {
    peripheral: &'a Peripheral,
    armed: bool,
}

impl<'a> PendingConnect<'a> {
    fn new(peripheral: &'a Peripheral) -> Self {
        Self {
            peripheral,
            armed: true,
        }
    }

    fn complete(mut self) {
        self.armed = false;
    }

    /// Disconnect now instead of on drop.
    async fn fail(mut self, err: Error) -> Error {
        self.armed = false;
        if let Err(e) = self.peripheral.disconnect().await {
            debug!("Error disconnecting after failed connect: {}", e);
        }
        err
    }
}

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(handle) = Handle::try_current() {
            debug!("Connect attempt dropped, disconnecting");
            let peripheral = self.peripheral.clone();
            handle.spawn(async move {
                if let Err(e) = peripheral.disconnect().await {
                    debug!("Error disconnecting dropped connect: {}", e);
                }
            });
        } else {
            warn!("No tokio runtime available for disconnect of dropped connect");
        }
    }
}

/// Transport over a btleplug peripheral.
pub struct BtleTransport {
    /// Kept alive for the lifetime of the peripheral.
    #[allow(dead_code)]
    adapter: Adapter,
    peripheral: Peripheral,
    config: ConnectionConfig,
}

impl std::fmt::Debug for BtleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleTransport")
            .field("peripheral", &self.peripheral.id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BtleTransport {
    /// Wrap an already-discovered peripheral.
    pub fn new(adapter: Adapter, peripheral: Peripheral, config: ConnectionConfig) -> Self {
        Self {
            adapter,
            peripheral,
            config,
        }
    }

    /// Scan for a peripheral by MAC address.
    ///
    /// Already-known peripherals are matched without scanning.
    #[tracing::instrument(
        level = "info",
        skip(config),
        fields(timeout_secs = scan_timeout.as_secs())
    )]
    pub async fn find(
        address: &str,
        scan_timeout: Duration,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let adapter = get_adapter().await?;

        if let Some(peripheral) = find_peripheral(&adapter, address).await? {
            info!("Found device in cache (no scan needed)");
            return Ok(Self::new(adapter, peripheral, config));
        }

        info!("Scanning for {} ({}s)...", address, scan_timeout.as_secs());
        adapter.start_scan(ScanFilter::default()).await?;
        sleep(scan_timeout).await;
        adapter.stop_scan().await?;

        match find_peripheral(&adapter, address).await? {
            Some(peripheral) => Ok(Self::new(adapter, peripheral, config)),
            None => {
                warn!("Device not found: {}", address);
                Err(Error::DeviceNotFound(address.to_string()))
            }
        }
    }

    /// Local name from the last advertisement.
    pub async fn local_name(&self) -> Result<Option<String>> {
        Ok(self
            .peripheral
            .properties()
            .await?
            .and_then(|p| p.local_name))
    }

    /// Manufacturer data from the last advertisement.
    pub async fn manufacturer_data(&self) -> Result<HashMap<u16, Vec<u8>>> {
        Ok(self
            .peripheral
            .properties()
            .await?
            .map(|p| p.manufacturer_data)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Transport for BtleTransport {
    type Link = BtleLink;

    #[tracing::instrument(level = "info", skip_all, fields(peripheral = ?self.peripheral.id()))]
    async fn connect(&self) -> Result<BtleLink> {
        let pending = PendingConnect::new(&self.peripheral);
        if !self.peripheral.is_connected().await.unwrap_or(false) {
            info!("Connecting to device...");
            if let Err(e) = self.peripheral.connect().await {
                return Err(pending.fail(e.into()).await);
            }
            info!("Connected!");
        }

        let discovery_timeout = self.config.operation_timeout;
        let discovery = timeout(discovery_timeout, self.peripheral.discover_services());
        let discovered = match discovery.await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::timeout("discover services", discovery_timeout)),
        };
        if let Err(e) = discovered {
            warn!("Service discovery failed: {}", e);
            return Err(pending.fail(e).await);
        }
        pending.complete();

        let services = self.peripheral.services();
        debug!("Found {} services", services.len());

        let mut service_ids = HashSet::new();
        let mut characteristics = HashMap::new();
        for service in &services {
            debug!("  Service: {}", service.uuid);
            service_ids.insert(service.uuid);
            for characteristic in &service.characteristics {
                debug!("    Characteristic: {}", characteristic.uuid);
                characteristics.insert((service.uuid, characteristic.uuid), characteristic.clone());
            }
        }

        Ok(BtleLink {
            peripheral: self.peripheral.clone(),
            services: service_ids,
            characteristics,
            operation_timeout: self.config.operation_timeout,
        })
    }

    async fn abort(&self) -> Result<()> {
        if self.peripheral.is_connected().await.unwrap_or(false) {
            debug!("Closing connection left by an abandoned connect");
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}

/// Connected btleplug peripheral with its discovered GATT table.
pub struct BtleLink {
    peripheral: Peripheral,
    services: HashSet<Uuid>,
    characteristics: HashMap<(Uuid, Uuid), Characteristic>,
    operation_timeout: Duration,
}

impl std::fmt::Debug for BtleLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleLink")
            .field("services", &self.services.len())
            .field("characteristics", &self.characteristics.len())
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

impl BtleLink {
    fn characteristic(&self, service: Uuid, uuid: Uuid) -> Result<&Characteristic> {
        self.characteristics
            .get(&(service, uuid))
            .ok_or_else(|| Error::characteristic_not_found(uuid))
    }
}

#[async_trait]
impl GattLink for BtleLink {
    fn has_service(&self, service: Uuid) -> bool {
        self.services.contains(&service)
    }

    fn has_characteristic(&self, service: Uuid, characteristic: Uuid) -> bool {
        self.characteristics.contains_key(&(service, characteristic))
    }

    async fn read(&self, service: Uuid, uuid: Uuid) -> Result<Vec<u8>> {
        let characteristic = self.characteristic(service, uuid)?;
        let data = timeout(self.operation_timeout, self.peripheral.read(characteristic))
            .await
            .map_err(|_| {
                Error::timeout(format!("read characteristic {uuid}"), self.operation_timeout)
            })??;
        Ok(data)
    }

    async fn write(&self, service: Uuid, uuid: Uuid, data: &[u8]) -> Result<()> {
        let characteristic = self.characteristic(service, uuid)?;
        timeout(
            self.operation_timeout,
            self.peripheral
                .write(characteristic, data, WriteType::WithResponse),
        )
        .await
        .map_err(|_| {
            Error::timeout(format!("write characteristic {uuid}"), self.operation_timeout)
        })??;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from device...");
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
