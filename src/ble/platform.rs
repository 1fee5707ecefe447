//! [`CentralAdapter`] over the `btleplug` crate.
//!
//! btleplug is async; the adapter seam is fire-and-callback. Every primitive
//! spawns a task on the runtime the binding was created on and reports the
//! outcome as a [`CentralCallback`] on an unbounded channel. Advertisements
//! seen by the adapter are reported as [`Sighting`]s on a second channel.

use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _,
    ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::ble::adapter::{
    AdapterState, CentralAdapter, CentralCallback, ScanApi, Sighting,
};
use crate::ble::gatt::{
    AttributePath, CharProperties, GattCharacteristic, GattDescriptor, GattService, WriteType,
};
use crate::ble::uuids::CLIENT_CHARACTERISTIC_CONFIG_UUID;
use crate::error::{Error, Result};
use crate::protocol::{ClientConfiguration, GattStatus};

/// Receiving ends of a [`BtleplugCentral`].
pub struct CentralChannels {
    /// Completions of issued requests, plus peer-initiated changes.
    pub callbacks: mpsc::UnboundedReceiver<CentralCallback>,
    /// Advertisements seen while the adapter scans.
    pub sightings: mpsc::UnboundedReceiver<Sighting>,
}

/// Addresses whose next disconnect event was requested locally.
#[derive(Debug, Default)]
struct LocalDisconnects(Mutex<HashSet<String>>);

impl LocalDisconnects {
    fn mark(&self, address: &str) {
        self.0.lock().insert(address.to_string());
    }

    /// Consume the mark for `address`. `true` means the event is swallowed.
    fn take(&self, address: &str) -> bool {
        self.0.lock().remove(address)
    }
}

/// A btleplug adapter driven through the [`CentralAdapter`] seam.
///
/// Addresses are btleplug peripheral identifiers rendered as strings, which
/// are stable on every platform btleplug supports.
pub struct BtleplugCentral {
    adapter: Adapter,
    runtime: Handle,
    state: Arc<RwLock<AdapterState>>,
    peripherals: Arc<RwLock<HashMap<String, Peripheral>>>,
    callback_tx: mpsc::UnboundedSender<CentralCallback>,
    local_disconnects: Arc<LocalDisconnects>,
    event_task: RwLock<Option<JoinHandle<()>>>,
    notification_tasks: RwLock<HashMap<String, JoinHandle<()>>>,
}

impl BtleplugCentral {
    /// Bind to the first Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdapterUnavailable`] if no adapter is present.
    pub async fn new() -> Result<(Self, CentralChannels)> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::AdapterUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::AdapterUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Self::with_adapter(adapter)
    }

    /// Bind to a specific adapter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] when called outside a tokio runtime.
    pub fn with_adapter(adapter: Adapter) -> Result<(Self, CentralChannels)> {
        let runtime = Handle::try_current()
            .map_err(|_| Error::Internal("btleplug binding needs a tokio runtime".to_string()))?;
        let (callback_tx, callbacks) = mpsc::unbounded_channel();
        let (sighting_tx, sightings) = mpsc::unbounded_channel();

        let central = Self {
            adapter,
            runtime,
            state: Arc::new(RwLock::new(AdapterState::Enabled)),
            peripherals: Arc::new(RwLock::new(HashMap::new())),
            callback_tx,
            local_disconnects: Arc::new(LocalDisconnects::default()),
            event_task: RwLock::new(None),
            notification_tasks: RwLock::new(HashMap::new()),
        };
        central.start_event_loop(sighting_tx);

        Ok((
            central,
            CentralChannels {
                callbacks,
                sightings,
            },
        ))
    }

    /// The underlying btleplug adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    fn start_event_loop(&self, sighting_tx: mpsc::UnboundedSender<Sighting>) {
        let adapter = self.adapter.clone();
        let state = self.state.clone();
        let peripherals = self.peripherals.clone();
        let callback_tx = self.callback_tx.clone();
        let local_disconnects = self.local_disconnects.clone();

        let handle = self.runtime.spawn(async move {
            let mut events = match adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    error!("Failed to get adapter events: {}", e);
                    return;
                }
            };

            while let Some(event) = events.next().await {
                match event {
                    CentralEvent::DeviceDiscovered(id)
                    | CentralEvent::DeviceUpdated(id)
                    | CentralEvent::ManufacturerDataAdvertisement { id, .. }
                    | CentralEvent::ServiceDataAdvertisement { id, .. }
                    | CentralEvent::ServicesAdvertisement { id, .. } => {
                        Self::report_sighting(&adapter, id, &peripherals, &sighting_tx).await;
                    }
                    CentralEvent::DeviceConnected(id) => {
                        trace!("Device connected: {:?}", id);
                    }
                    CentralEvent::DeviceDisconnected(id) => {
                        let address = id.to_string();
                        if local_disconnects.take(&address) {
                            trace!("Local disconnect of {} completed", address);
                            continue;
                        }
                        debug!("Device disconnected: {:?}", id);
                        let _ = callback_tx.send(CentralCallback::ConnectionStateChanged {
                            address,
                            status: GattStatus::SUCCESS,
                            connected: false,
                        });
                    }
                    CentralEvent::StateUpdate(update) => {
                        let new_state = match update {
                            CentralState::PoweredOff => AdapterState::Disabled,
                            _ => AdapterState::Enabled,
                        };
                        info!("Adapter state now {:?}", new_state);
                        *state.write() = new_state;
                    }
                    #[allow(unreachable_patterns)]
                    _ => {}
                }
            }

            debug!("Adapter event loop ended");
        });

        *self.event_task.write() = Some(handle);
    }

    async fn report_sighting(
        adapter: &Adapter,
        id: PeripheralId,
        peripherals: &Arc<RwLock<HashMap<String, Peripheral>>>,
        sighting_tx: &mpsc::UnboundedSender<Sighting>,
    ) {
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

        let address = id.to_string();
        peripherals.write().insert(address.clone(), peripheral);

        if let Some(rssi) = properties.rssi {
            let _ = sighting_tx.send(Sighting {
                address,
                name: properties.local_name,
                rssi,
            });
        }
    }

    fn peripheral(&self, address: &str) -> Result<Peripheral> {
        self.peripherals
            .read()
            .get(address)
            .cloned()
            .ok_or_else(|| Error::InvalidParameter {
                name: "address".to_string(),
                value: address.to_string(),
            })
    }

    fn characteristic(peripheral: &Peripheral, path: &AttributePath) -> Result<Characteristic> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == path.characteristic && c.service_uuid == path.service)
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: path.characteristic.to_string(),
            })
    }

    /// Run `operation` and send the callback it produces.
    fn complete<F>(&self, operation: F)
    where
        F: Future<Output = CentralCallback> + Send + 'static,
    {
        let callback_tx = self.callback_tx.clone();
        self.runtime.spawn(async move {
            let _ = callback_tx.send(operation.await);
        });
    }

    fn watch_notifications(&self, address: &str, peripheral: Peripheral) {
        let callback_tx = self.callback_tx.clone();
        let owner = address.to_string();

        let handle = self.runtime.spawn(async move {
            let mut stream = match peripheral.notifications().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Failed to get notification stream for {}: {}", owner, e);
                    return;
                }
            };

            while let Some(notification) = stream.next().await {
                let service = peripheral
                    .characteristics()
                    .into_iter()
                    .find(|c| c.uuid == notification.uuid)
                    .map(|c| c.service_uuid)
                    .unwrap_or_default();
                let _ = callback_tx.send(CentralCallback::CharacteristicChanged {
                    address: owner.clone(),
                    path: AttributePath::characteristic(service, notification.uuid),
                    value: notification.value,
                });
            }

            trace!("Notification stream for {} ended", owner);
        });

        if let Some(previous) = self
            .notification_tasks
            .write()
            .insert(address.to_string(), handle)
        {
            previous.abort();
        }
    }
}

/// Convert a btleplug profile.
pub fn convert_services(services: BTreeSet<btleplug::api::Service>) -> Vec<GattService> {
    services
        .into_iter()
        .map(|service| GattService {
            uuid: service.uuid,
            primary: service.primary,
            characteristics: service
                .characteristics
                .into_iter()
                .map(|c| GattCharacteristic {
                    uuid: c.uuid,
                    properties: CharProperties::from_raw(c.properties.bits()),
                    descriptors: c
                        .descriptors
                        .into_iter()
                        .map(|d| GattDescriptor::new(d.uuid))
                        .collect(),
                })
                .collect(),
        })
        .collect()
}

fn status_of<T>(result: &std::result::Result<T, btleplug::Error>, operation: &str) -> GattStatus {
    match result {
        Ok(_) => GattStatus::SUCCESS,
        Err(e) => {
            warn!("{} failed: {}", operation, e);
            GattStatus::FAILURE
        }
    }
}

impl CentralAdapter for BtleplugCentral {
    fn state(&self) -> AdapterState {
        *self.state.read()
    }

    fn scan_api(&self) -> ScanApi {
        ScanApi::Modern
    }

    fn start_scan(&self) -> Result<()> {
        let adapter = self.adapter.clone();
        self.runtime.spawn(async move {
            if let Err(e) = adapter.start_scan(ScanFilter::default()).await {
                error!("Failed to start scan: {}", e);
            }
        });
        Ok(())
    }

    fn stop_scan(&self) -> Result<()> {
        let adapter = self.adapter.clone();
        self.runtime.spawn(async move {
            if let Err(e) = adapter.stop_scan().await {
                warn!("Failed to stop scan: {}", e);
            }
        });
        Ok(())
    }

    fn connect(&self, address: &str) -> Result<()> {
        let peripheral = self.peripheral(address)?;
        self.watch_notifications(address, peripheral.clone());

        let address = address.to_string();
        self.complete(async move {
            let result = peripheral.connect().await;
            let status = status_of(&result, "connect");
            CentralCallback::ConnectionStateChanged {
                address,
                status,
                connected: result.is_ok(),
            }
        });
        Ok(())
    }

    fn disconnect(&self, address: &str) -> Result<()> {
        if let Some(task) = self.notification_tasks.write().remove(address) {
            task.abort();
        }
        let peripheral = self.peripheral(address)?;
        let owner = address.to_string();
        let local_disconnects = self.local_disconnects.clone();
        self.runtime.spawn(async move {
            if peripheral.is_connected().await.unwrap_or(false) {
                local_disconnects.mark(&owner);
            }
            if let Err(e) = peripheral.disconnect().await {
                warn!("Failed to disconnect from {}: {}", owner, e);
            }
        });
        Ok(())
    }

    fn discover_services(&self, address: &str) -> Result<()> {
        let peripheral = self.peripheral(address)?;
        let address = address.to_string();
        self.complete(async move {
            let result = peripheral.discover_services().await;
            let status = status_of(&result, "service discovery");
            let services = if status.is_success() {
                convert_services(peripheral.services())
            } else {
                Vec::new()
            };
            CentralCallback::ServicesDiscovered {
                address,
                status,
                services,
            }
        });
        Ok(())
    }

    fn read_characteristic(&self, address: &str, path: &AttributePath) -> Result<()> {
        let peripheral = self.peripheral(address)?;
        let characteristic = Self::characteristic(&peripheral, path)?;
        let address = address.to_string();
        let path = *path;
        self.complete(async move {
            let result = peripheral.read(&characteristic).await;
            let status = status_of(&result, "read");
            CentralCallback::CharacteristicRead {
                address,
                path,
                status,
                value: result.unwrap_or_default(),
            }
        });
        Ok(())
    }

    fn write_characteristic(
        &self,
        address: &str,
        path: &AttributePath,
        value: &[u8],
        write_type: WriteType,
    ) -> Result<()> {
        let peripheral = self.peripheral(address)?;
        let characteristic = Self::characteristic(&peripheral, path)?;
        let write_type = match write_type {
            WriteType::WithResponse => btleplug::api::WriteType::WithResponse,
            WriteType::WithoutResponse => btleplug::api::WriteType::WithoutResponse,
        };
        let address = address.to_string();
        let path = *path;
        let value = value.to_vec();
        self.complete(async move {
            let result = peripheral.write(&characteristic, &value, write_type).await;
            CentralCallback::CharacteristicWrite {
                address,
                path,
                status: status_of(&result, "write"),
            }
        });
        Ok(())
    }

    fn set_notification_enabled(
        &self,
        _address: &str,
        path: &AttributePath,
        enabled: bool,
    ) -> Result<()> {
        // btleplug enables local delivery together with the descriptor write.
        trace!("Local notifications on {}: {}", path, enabled);
        Ok(())
    }

    fn write_descriptor(&self, address: &str, path: &AttributePath, value: &[u8]) -> Result<()> {
        let peripheral = self.peripheral(address)?;
        let characteristic = Self::characteristic(&peripheral, path)?;
        let address = address.to_string();
        let path = *path;

        if path.descriptor == Some(CLIENT_CHARACTERISTIC_CONFIG_UUID) {
            let configuration =
                ClientConfiguration::from_bytes(value).ok_or_else(|| Error::InvalidParameter {
                    name: "cccd".to_string(),
                    value: format!("{:02x?}", value),
                })?;
            self.complete(async move {
                let result = if configuration.is_enabled() {
                    peripheral.subscribe(&characteristic).await
                } else {
                    peripheral.unsubscribe(&characteristic).await
                };
                CentralCallback::DescriptorWrite {
                    address,
                    path,
                    status: status_of(&result, "subscription change"),
                }
            });
            return Ok(());
        }

        let descriptor = characteristic
            .descriptors
            .iter()
            .find(|d| Some(d.uuid) == path.descriptor)
            .cloned()
            .ok_or_else(|| Error::DescriptorNotFound {
                uuid: path
                    .descriptor
                    .map(|uuid| uuid.to_string())
                    .unwrap_or_default(),
            })?;
        let value = value.to_vec();
        self.complete(async move {
            let result = peripheral.write_descriptor(&descriptor, &value).await;
            CentralCallback::DescriptorWrite {
                address,
                path,
                status: status_of(&result, "descriptor write"),
            }
        });
        Ok(())
    }
}

impl Drop for BtleplugCentral {
    fn drop(&mut self) {
        if let Some(task) = self.event_task.write().take() {
            task.abort();
        }
        for (_, task) in self.notification_tasks.write().drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::uuids::{BATTERY_LEVEL_UUID, BATTERY_SERVICE_UUID};
    use btleplug::api::{CharPropFlags, Descriptor};

    #[test]
    fn test_convert_services() {
        let mut descriptors = BTreeSet::new();
        descriptors.insert(Descriptor {
            uuid: CLIENT_CHARACTERISTIC_CONFIG_UUID,
            service_uuid: BATTERY_SERVICE_UUID,
            characteristic_uuid: BATTERY_LEVEL_UUID,
        });
        let mut characteristics = BTreeSet::new();
        characteristics.insert(Characteristic {
            uuid: BATTERY_LEVEL_UUID,
            service_uuid: BATTERY_SERVICE_UUID,
            properties: CharPropFlags::READ | CharPropFlags::NOTIFY,
            descriptors,
        });
        let mut services = BTreeSet::new();
        services.insert(btleplug::api::Service {
            uuid: BATTERY_SERVICE_UUID,
            primary: true,
            characteristics,
        });

        let converted = convert_services(services);
        assert_eq!(converted.len(), 1);
        let chr = converted[0].characteristic(&BATTERY_LEVEL_UUID).unwrap();
        assert!(chr.properties.can_read());
        assert!(chr.properties.contains(CharProperties::NOTIFY));
        assert!(!chr.properties.can_write());
        assert!(chr.has_cccd());
    }

    #[test]
    fn test_local_disconnect_mark_is_consumed_once() {
        let marks = LocalDisconnects::default();
        assert!(!marks.take("peer"));

        marks.mark("peer");
        assert!(marks.take("peer"));
        assert!(!marks.take("peer"));
    }
}
