//! [`Radio`] implementation on top of btleplug.

use async_trait::async_trait;
use btleplug::api::{
    Central as _, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};
use uuid::Uuid;

use crate::ble::adapter::AdapterState;
use crate::ble::radio::{ChannelHandle, EventSink, PeripheralHandle, Radio, ServiceHandle};
use crate::error::{Error, Result};
use crate::session::Event;

/// Radio backed by the first Bluetooth adapter of the system.
pub struct BtleplugRadio {
    /// The BLE adapter.
    adapter: Adapter,
    /// Peripherals seen while scanning, by platform identifier.
    peripherals: Arc<RwLock<HashMap<String, Peripheral>>>,
    /// Service filter of the running scan; empty when not scanning.
    scan_filter: Arc<RwLock<Vec<Uuid>>>,
    /// Handle to the adapter event task.
    event_handle: RwLock<Option<JoinHandle<()>>>,
}

impl BtleplugRadio {
    /// Open the first adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Use a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            peripherals: Arc::new(RwLock::new(HashMap::new())),
            scan_filter: Arc::new(RwLock::new(Vec::new())),
            event_handle: RwLock::new(None),
        }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    fn peripheral(&self, handle: &PeripheralHandle) -> Result<Peripheral> {
        self.peripherals
            .read()
            .get(handle.id())
            .cloned()
            .ok_or_else(|| Error::PeripheralNotFound {
                identifier: handle.id().to_string(),
            })
    }

    fn characteristic(peripheral: &Peripheral, channel: &ChannelHandle) -> Result<Characteristic> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == channel.uuid && c.service_uuid == channel.service_uuid)
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: channel.uuid.to_string(),
            })
    }

    /// Handle a BLE central event.
    async fn handle_event(
        event: CentralEvent,
        adapter: &Adapter,
        peripherals: &Arc<RwLock<HashMap<String, Peripheral>>>,
        scan_filter: &Arc<RwLock<Vec<Uuid>>>,
        sink: &EventSink,
    ) {
        match event {
            CentralEvent::StateUpdate(state) => {
                sink.emit(Event::PowerChanged(AdapterState::from(state)));
            }
            CentralEvent::DeviceDiscovered(id)
            | CentralEvent::DeviceUpdated(id)
            | CentralEvent::ServicesAdvertisement { id, .. } => {
                trace!("Advertisement from {:?}", id);
                Self::process_peripheral(adapter, id, peripherals, scan_filter, sink).await;
            }
            CentralEvent::DeviceConnected(id) => {
                debug!("Device connected: {:?}", id);
            }
            CentralEvent::DeviceDisconnected(id) => {
                debug!("Device disconnected: {:?}", id);
                sink.emit(Event::Disconnected {
                    peripheral: PeripheralHandle::new(id.to_string()),
                });
            }
            _ => {}
        }
    }

    /// Report a peripheral if it advertises a service of the running scan.
    async fn process_peripheral(
        adapter: &Adapter,
        id: PeripheralId,
        peripherals: &Arc<RwLock<HashMap<String, Peripheral>>>,
        scan_filter: &Arc<RwLock<Vec<Uuid>>>,
        sink: &EventSink,
    ) {
        let filter = scan_filter.read().clone();
        if filter.is_empty() {
            return;
        }

        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return,
        };

        if !properties.services.iter().any(|uuid| filter.contains(uuid)) {
            return;
        }

        let identifier = id.to_string();
        trace!(
            "Matching advertisement from {} (rssi {:?})",
            identifier,
            properties.rssi
        );
        peripherals.write().insert(identifier.clone(), peripheral);

        sink.emit(Event::PeripheralDiscovered {
            peripheral: PeripheralHandle::new(identifier),
        });
    }
}

#[async_trait]
impl Radio for BtleplugRadio {
    async fn subscribe(&self, sink: EventSink) -> Result<()> {
        let state = self.adapter.adapter_state().await.map_err(Error::Bluetooth)?;
        sink.emit(Event::PowerChanged(AdapterState::from(state)));

        let mut events = self.adapter.events().await.map_err(Error::Bluetooth)?;

        let adapter = self.adapter.clone();
        let peripherals = self.peripherals.clone();
        let scan_filter = self.scan_filter.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if sink.is_closed() {
                    break;
                }
                Self::handle_event(event, &adapter, &peripherals, &scan_filter, &sink).await;
            }

            debug!("Adapter event loop ended");
        });

        if let Some(old) = self.event_handle.write().replace(handle) {
            old.abort();
        }

        Ok(())
    }

    async fn start_scan(&self, services: &[Uuid]) -> Result<()> {
        info!("Starting BLE scan for {:?}", services);

        *self.scan_filter.write() = services.to_vec();

        let mut filter = ScanFilter::default();
        filter.services = services.to_vec();

        self.adapter
            .start_scan(filter)
            .await
            .map_err(Error::Bluetooth)
    }

    async fn stop_scan(&self) -> Result<()> {
        let was_scanning = !std::mem::take(&mut *self.scan_filter.write()).is_empty();
        if !was_scanning {
            trace!("Not scanning, ignoring stop request");
            return Ok(());
        }

        debug!("Stopping BLE scan");
        self.adapter.stop_scan().await.map_err(Error::Bluetooth)
    }

    async fn connect(&self, peripheral: &PeripheralHandle) -> Result<()> {
        let target = self.peripheral(peripheral)?;

        if target.is_connected().await.unwrap_or(false) {
            info!("Peripheral {} already connected at BLE level", peripheral);
            return Ok(());
        }

        target.connect().await.map_err(Error::Bluetooth)?;
        info!("Successfully connected to {}", peripheral);
        Ok(())
    }

    async fn cancel_connection(&self, peripheral: &PeripheralHandle) -> Result<()> {
        let Some(target) = self.peripherals.write().remove(peripheral.id()) else {
            return Ok(());
        };

        if !target.is_connected().await.unwrap_or(false) {
            return Ok(());
        }

        match target.disconnect().await {
            Ok(()) => {
                info!("Successfully disconnected from {}", peripheral);
                Ok(())
            }
            Err(e) => {
                error!("Failed to disconnect: {}", e);
                Err(Error::Bluetooth(e))
            }
        }
    }

    async fn discover_services(
        &self,
        peripheral: &PeripheralHandle,
        services: &[Uuid],
    ) -> Result<Vec<ServiceHandle>> {
        let target = self.peripheral(peripheral)?;

        target.discover_services().await.map_err(Error::Bluetooth)?;

        let found: Vec<ServiceHandle> = target
            .services()
            .into_iter()
            .filter(|service| services.is_empty() || services.contains(&service.uuid))
            .map(|service| ServiceHandle { uuid: service.uuid })
            .collect();

        debug!("Discovered {} matching services on {}", found.len(), peripheral);
        Ok(found)
    }

    async fn discover_characteristics(
        &self,
        peripheral: &PeripheralHandle,
        service: &ServiceHandle,
    ) -> Result<Vec<ChannelHandle>> {
        let target = self.peripheral(peripheral)?;

        // btleplug discovers characteristics together with services.
        let found = target
            .services()
            .into_iter()
            .find(|s| s.uuid == service.uuid)
            .ok_or_else(|| Error::ServiceNotFound {
                uuid: service.uuid.to_string(),
            })?;

        Ok(found
            .characteristics
            .into_iter()
            .map(|c| {
                debug!("Found characteristic: {} in service {}", c.uuid, c.service_uuid);
                ChannelHandle {
                    uuid: c.uuid,
                    service_uuid: c.service_uuid,
                }
            })
            .collect())
    }

    async fn write_value(
        &self,
        peripheral: &PeripheralHandle,
        channel: &ChannelHandle,
        value: &[u8],
        ack_required: bool,
    ) -> Result<()> {
        let target = self.peripheral(peripheral)?;
        let characteristic = Self::characteristic(&target, channel)?;

        let write_type = if ack_required {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        target
            .write(&characteristic, value, write_type)
            .await
            .map_err(Error::Bluetooth)?;

        trace!("Wrote {} bytes to characteristic {}", value.len(), channel.uuid);
        Ok(())
    }

    async fn read_value(
        &self,
        peripheral: &PeripheralHandle,
        channel: &ChannelHandle,
    ) -> Result<Vec<u8>> {
        let target = self.peripheral(peripheral)?;
        let characteristic = Self::characteristic(&target, channel)?;

        let data = target.read(&characteristic).await.map_err(Error::Bluetooth)?;

        trace!("Read {} bytes from characteristic {}", data.len(), channel.uuid);
        Ok(data)
    }
}

impl Drop for BtleplugRadio {
    fn drop(&mut self) {
        if let Some(handle) = self.event_handle.write().take() {
            handle.abort();
        }
    }
}
