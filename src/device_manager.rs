//! Device manager: the central role wired to a platform adapter.
//!
//! Owns a [`DiscoveryCache`], a [`ScanController`] and a [`ClientSession`],
//! and runs the pump tasks that feed adapter callbacks and sightings into
//! them.

use parking_lot::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ble::adapter::CentralAdapter;
use crate::ble::discovery::{DiscoveryCache, DiscoveryEvent, RemoteDevice};
use crate::ble::gatt::GattService;
use crate::ble::platform::{BtleplugCentral, CentralChannels};
use crate::ble::scanner::{ScanController, ScanEvent};
use crate::callback::{spawn_listener, CallbackHandle};
use crate::client::ClientSession;
use crate::config::EngineConfig;
use crate::error::Result;

/// Central manager for discovering and talking to remote devices.
pub struct DeviceManager {
    /// Platform binding.
    adapter: Arc<dyn CentralAdapter>,
    /// Devices seen while scanning.
    cache: Arc<DiscoveryCache>,
    /// Scan lifecycle.
    scanner: Arc<ScanController>,
    /// GATT client.
    client: Arc<ClientSession>,
    /// Configuration in use.
    config: EngineConfig,
    /// Callback ID counter.
    callback_counter: AtomicU64,
    /// Pump task handles.
    pumps: RwLock<Vec<JoinHandle<()>>>,
}

impl DeviceManager {
    /// Create a manager on the first Bluetooth adapter with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        Self::with_config(EngineConfig::default()).await
    }

    /// Create a manager on the first Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or Bluetooth is not
    /// available.
    pub async fn with_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let (central, channels) = BtleplugCentral::new().await?;
        Self::from_adapter(Arc::new(central), channels, config)
    }

    /// Create a manager over any adapter and its callback channels.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_adapter(
        adapter: Arc<dyn CentralAdapter>,
        channels: CentralChannels,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(DiscoveryCache::with_debounce(config.scan.rssi_debounce));
        let scanner = Arc::new(ScanController::new(
            adapter.clone(),
            cache.clone(),
            &config.scan,
        ));
        let client = Arc::new(ClientSession::new(
            adapter.clone(),
            config.transport.clone(),
        ));

        let manager = Self {
            adapter,
            cache,
            scanner,
            client,
            config,
            callback_counter: AtomicU64::new(0),
            pumps: RwLock::new(Vec::new()),
        };
        manager.start_pumps(channels);

        Ok(manager)
    }

    fn start_pumps(&self, channels: CentralChannels) {
        let CentralChannels {
            mut callbacks,
            mut sightings,
        } = channels;

        let client = self.client.clone();
        let callback_pump = tokio::spawn(async move {
            while let Some(callback) = callbacks.recv().await {
                client.handle_callback(callback);
            }
            debug!("Callback pump ended");
        });

        let scanner = self.scanner.clone();
        let sighting_pump = tokio::spawn(async move {
            while let Some(sighting) = sightings.recv().await {
                scanner.on_sighting(&sighting);
            }
            debug!("Sighting pump ended");
        });

        self.pumps.write().extend([callback_pump, sighting_pump]);
    }

    // === Scanning ===

    /// Start scanning, keeping previously discovered devices.
    ///
    /// # Errors
    ///
    /// See [`ScanController::start_scan`].
    pub fn start_scanning(&self) -> Result<()> {
        info!("Starting device manager scanning");
        self.scanner.start_scan()
    }

    /// Forget discovered devices and scan again.
    ///
    /// # Errors
    ///
    /// See [`ScanController::rescan`].
    pub fn rescan(&self) -> Result<()> {
        self.scanner.rescan()
    }

    /// Stop scanning. Returns `false` if no scan was running.
    pub fn stop_scanning(&self) -> bool {
        self.scanner.stop_scan()
    }

    /// Check if scanning is active.
    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    // === Discovered devices ===

    /// All discovered devices in discovery order.
    pub fn devices(&self) -> Vec<RemoteDevice> {
        self.cache.devices()
    }

    /// Get a discovered device by address.
    pub fn get_device(&self, address: &str) -> Option<RemoteDevice> {
        self.cache.get(address)
    }

    /// Get the nearest device by signal strength.
    pub fn get_nearest_device(&self) -> Option<RemoteDevice> {
        self.cache.strongest()
    }

    /// Get devices sorted by signal strength (strongest first).
    pub fn get_devices_by_signal(&self) -> Vec<RemoteDevice> {
        let mut devices = self.cache.devices();
        devices.sort_by_key(|d| std::cmp::Reverse(d.rssi));
        devices
    }

    /// Get the number of discovered devices.
    pub fn device_count(&self) -> usize {
        self.cache.len()
    }

    /// Subscribe to discovery events.
    pub fn subscribe_discovery(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.cache.subscribe()
    }

    /// Register a callback for newly discovered devices.
    pub fn on_device_discovered<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(RemoteDevice) + Send + Sync + 'static,
    {
        spawn_listener(
            &self.callback_counter,
            self.cache.subscribe(),
            |event| match event {
                DiscoveryEvent::DeviceAdded(device) => Some(device),
                _ => None,
            },
            callback,
        )
    }

    /// Register a callback for RSSI changes of known devices.
    pub fn on_device_updated<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(RemoteDevice) + Send + Sync + 'static,
    {
        spawn_listener(
            &self.callback_counter,
            self.cache.subscribe(),
            |event| match event {
                DiscoveryEvent::DeviceChanged(device) => Some(device),
                _ => None,
            },
            callback,
        )
    }

    /// Register a callback for the end of a scan.
    pub fn on_scan_complete<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        spawn_listener(
            &self.callback_counter,
            self.scanner.subscribe(),
            |event| matches!(event, ScanEvent::Complete).then_some(()),
            move |()| callback(),
        )
    }

    // === Connection ===

    /// Stop any scan, connect to `address` and discover its profile.
    ///
    /// # Errors
    ///
    /// See [`ClientSession::connect_and_discover`].
    pub async fn connect(&self, address: &str, timeout: Duration) -> Result<Vec<GattService>> {
        if self.scanner.stop_scan() {
            debug!("Stopped scan before connecting to {}", address);
        }
        self.client.connect_and_discover(address, timeout).await
    }

    /// The GATT client session.
    pub fn client(&self) -> &Arc<ClientSession> {
        &self.client
    }

    /// The scan controller.
    pub fn scanner(&self) -> &Arc<ScanController> {
        &self.scanner
    }

    /// The platform adapter.
    pub fn adapter(&self) -> &Arc<dyn CentralAdapter> {
        &self.adapter
    }

    /// Configuration in use.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Clean shutdown of scanning and the client link.
    pub fn shutdown(&self) -> Result<()> {
        info!("Shutting down device manager");

        self.scanner.stop_scan();

        if let Err(e) = self.client.disconnect() {
            warn!("Error disconnecting: {}", e);
        }

        for pump in self.pumps.write().drain(..) {
            pump.abort();
        }

        self.cache.clear();

        Ok(())
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        for pump in self.pumps.write().drain(..) {
            pump.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::adapter::{AdapterState, CentralCallback, MockCentralAdapter, ScanApi, Sighting};
    use crate::client::ClientState;
    use crate::protocol::GattStatus;
    use tokio::sync::mpsc;

    const ADDR: &str = "AA:BB:CC:DD:EE:01";

    fn base_adapter() -> MockCentralAdapter {
        let mut adapter = MockCentralAdapter::new();
        adapter.expect_state().return_const(AdapterState::Enabled);
        adapter.expect_scan_api().return_const(ScanApi::Modern);
        adapter.expect_start_scan().returning(|| Ok(()));
        adapter.expect_stop_scan().returning(|| Ok(()));
        adapter
    }

    fn manager(
        adapter: MockCentralAdapter,
    ) -> (
        DeviceManager,
        mpsc::UnboundedSender<CentralCallback>,
        mpsc::UnboundedSender<Sighting>,
    ) {
        let (callback_tx, callbacks) = mpsc::unbounded_channel();
        let (sighting_tx, sightings) = mpsc::unbounded_channel();
        let manager = DeviceManager::from_adapter(
            Arc::new(adapter),
            CentralChannels {
                callbacks,
                sightings,
            },
            EngineConfig::default(),
        )
        .unwrap();
        (manager, callback_tx, sighting_tx)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_sightings_reach_cache_while_scanning() {
        let (manager, _callbacks, sightings) = manager(base_adapter());

        tokio_test::assert_ok!(manager.start_scanning());
        assert!(manager.is_scanning());

        sightings
            .send(Sighting {
                address: ADDR.to_string(),
                name: Some("Sensor".to_string()),
                rssi: -60,
            })
            .unwrap();
        settle().await;

        assert_eq!(manager.device_count(), 1);
        let device = manager.get_device(ADDR).unwrap();
        assert_eq!(device.display_name(), "Sensor");
        assert_eq!(manager.get_nearest_device().unwrap().address, ADDR);

        assert!(manager.stop_scanning());
        assert!(!manager.is_scanning());
    }

    #[tokio::test]
    async fn test_on_device_discovered_callback() {
        let (manager, _callbacks, sightings) = manager(base_adapter());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _handle = manager.on_device_discovered(move |device| {
            sink.lock().push(device.address);
        });

        manager.start_scanning().unwrap();
        for rssi in [-70, -50] {
            sightings
                .send(Sighting {
                    address: ADDR.to_string(),
                    name: None,
                    rssi,
                })
                .unwrap();
        }
        settle().await;

        assert_eq!(*seen.lock(), vec![ADDR.to_string()]);
    }

    #[tokio::test]
    async fn test_callbacks_reach_client() {
        let mut adapter = base_adapter();
        adapter.expect_connect().times(1).returning(|_| Ok(()));
        adapter.expect_discover_services().times(1).returning(|_| Ok(()));
        adapter.expect_disconnect().times(1).returning(|_| Ok(()));
        let (manager, callbacks, _sightings) = manager(adapter);

        manager.client().connect(ADDR).unwrap();
        callbacks
            .send(CentralCallback::ConnectionStateChanged {
                address: ADDR.to_string(),
                status: GattStatus::SUCCESS,
                connected: true,
            })
            .unwrap();
        settle().await;
        assert_eq!(manager.client().state(), ClientState::DiscoveringServices);

        manager.shutdown().unwrap();
        assert_eq!(manager.client().state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let (_callback_tx, callbacks) = mpsc::unbounded_channel();
        let (_sighting_tx, sightings) = mpsc::unbounded_channel();
        let mut config = EngineConfig::default();
        config.server.max_pending_pushes = 0;

        let result = DeviceManager::from_adapter(
            Arc::new(MockCentralAdapter::new()),
            CentralChannels {
                callbacks,
                sightings,
            },
            config,
        );
        assert!(result.is_err());
    }
}
