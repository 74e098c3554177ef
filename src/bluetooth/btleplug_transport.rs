//! [`Transport`] implementation on top of btleplug

use std::collections::HashMap;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::bluetooth::transport::{
    ConnectOptions, DisconnectCallback, DisconnectSubscription, ScanCallback, ScanEvent, Transport,
};
use crate::bluetooth::{DeviceId, PeripheralIdentity};
use crate::error::BleError;

/// Peripherals resolved for sessions, by id
///
/// Filled lazily when a session first touches a device, never by the scan
/// itself, and emptied when the scan stops.
struct PeripheralCache<P> {
    entries: Mutex<HashMap<DeviceId, P>>,
}

impl<P: Clone> PeripheralCache<P> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn get(&self, id: &DeviceId) -> Option<P> {
        self.entries.lock().await.get(id).cloned()
    }

    async fn insert(&self, id: DeviceId, peripheral: P) {
        self.entries.lock().await.insert(id, peripheral);
    }

    async fn clear(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        count
    }
}

/// Bluetooth transport backed by the first system adapter
pub struct BtleplugTransport {
    adapter: Adapter,
    peripherals: PeripheralCache<Peripheral>,
    scan_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl BtleplugTransport {
    /// Open the first available adapter
    pub async fn new() -> Result<Self, BleError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(BleError::AdapterNotFound)?;
        match adapter.adapter_info().await {
            Ok(info) => info!("Using adapter {}", info),
            Err(e) => debug!("Adapter info unavailable: {}", e),
        }
        Ok(Self::with_adapter(adapter))
    }

    /// Use a specific adapter
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            peripherals: PeripheralCache::new(),
            scan_task: std::sync::Mutex::new(None),
        }
    }

    fn device_id(id: &PeripheralId) -> DeviceId {
        DeviceId::new(format!("{:?}", id))
    }

    async fn identify(
        adapter: &Adapter,
        id: &PeripheralId,
    ) -> Result<Option<PeripheralIdentity>, BleError> {
        let peripheral = adapter.peripheral(id).await?;
        let Some(properties) = peripheral.properties().await? else {
            return Ok(None);
        };
        Ok(Some(PeripheralIdentity::new(
            Self::device_id(id),
            properties.local_name,
            properties.rssi,
        )))
    }

    async fn peripheral(&self, id: &DeviceId) -> Result<Peripheral, BleError> {
        if let Some(peripheral) = self.peripherals.get(id).await {
            return Ok(peripheral);
        }

        for peripheral in self.adapter.peripherals().await? {
            if Self::device_id(&peripheral.id()) == *id {
                self.peripherals.insert(id.clone(), peripheral.clone()).await;
                return Ok(peripheral);
            }
        }
        Err(BleError::DeviceNotFound(id.to_string()))
    }

    fn find_characteristic(
        peripheral: &Peripheral,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Characteristic, BleError> {
        let service_entry = peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == service)
            .ok_or(BleError::ServiceNotFound(service))?;
        service_entry
            .characteristics
            .into_iter()
            .find(|c| c.uuid == characteristic)
            .ok_or(BleError::CharacteristicNotFound {
                service,
                characteristic,
            })
    }

    fn scan_running(&self) -> bool {
        self.scan_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    async fn start_scan(&self, on_event: ScanCallback) -> Result<(), BleError> {
        if self.scan_running() {
            return Err(BleError::ScanInProgress);
        }

        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        let adapter = self.adapter.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };
                match Self::identify(&adapter, &id).await {
                    Ok(Some(identity)) => on_event(ScanEvent::Discovered(identity)),
                    Ok(None) => debug!("No properties yet for {:?}", id),
                    Err(e) => on_event(ScanEvent::Error(e)),
                }
            }
            debug!("Adapter event stream ended");
        });

        *self.scan_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), BleError> {
        let task = self
            .scan_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
        self.adapter.stop_scan().await?;
        let dropped = self.peripherals.clear().await;
        debug!("Forgot {} cached peripherals", dropped);
        Ok(())
    }

    async fn connect(&self, id: &DeviceId, options: ConnectOptions) -> Result<(), BleError> {
        let peripheral = self.peripheral(id).await?;
        // btleplug leaves MTU negotiation to the platform stack
        debug!("Connecting to {} (requested MTU {})", id, options.mtu);
        peripheral.connect().await?;
        Ok(())
    }

    async fn discover_all(&self, id: &DeviceId) -> Result<(), BleError> {
        let peripheral = self.peripheral(id).await?;
        peripheral.discover_services().await?;
        debug!(
            "Discovered {} services on {}",
            peripheral.services().len(),
            id
        );
        Ok(())
    }

    async fn read_rssi(&self, id: &DeviceId) -> Result<i16, BleError> {
        let peripheral = self.peripheral(id).await?;
        let rssi = peripheral.properties().await?.and_then(|p| p.rssi);
        Ok(rssi.unwrap_or(0))
    }

    async fn read_characteristic(
        &self,
        id: &DeviceId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Option<Vec<u8>>, BleError> {
        let peripheral = self.peripheral(id).await?;
        let target = Self::find_characteristic(&peripheral, service, characteristic)?;
        let value = peripheral.read(&target).await?;
        debug!("Read {} bytes from {}", value.len(), characteristic);
        Ok(if value.is_empty() { None } else { Some(value) })
    }

    async fn write_characteristic(
        &self,
        id: &DeviceId,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), BleError> {
        let peripheral = self.peripheral(id).await?;
        let target = Self::find_characteristic(&peripheral, service, characteristic)?;
        peripheral.write(&target, data, WriteType::WithResponse).await?;
        Ok(())
    }

    async fn disconnect(&self, id: &DeviceId) -> Result<(), BleError> {
        let peripheral = self.peripheral(id).await?;
        peripheral.disconnect().await?;
        Ok(())
    }

    async fn on_disconnected(
        &self,
        id: &DeviceId,
        callback: DisconnectCallback,
    ) -> Result<DisconnectSubscription, BleError> {
        let target = self.peripheral(id).await?.id();
        let mut events = self.adapter.events().await?;
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(disconnected) = event {
                    if disconnected == target {
                        callback();
                    }
                }
            }
        });
        Ok(DisconnectSubscription::new(move || task.abort()))
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        if let Some(task) = self
            .scan_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            warn!("Transport dropped while scanning");
            task.abort();
        }
    }
}
