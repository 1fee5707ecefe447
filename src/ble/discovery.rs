//! Scan-result deduplication.
//!
//! Keeps one entry per hardware address for the lifetime of a scan session.
//! RSSI updates are debounced so a chatty advertiser does not flood
//! consumers with change events.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::utils::estimate_distance;

/// Default minimum interval between RSSI updates of one device.
pub const DEFAULT_RSSI_DEBOUNCE: Duration = Duration::from_millis(1000);

/// A device seen while scanning.
///
/// Equality and hashing use the address only.
#[derive(Debug, Clone)]
pub struct RemoteDevice {
    /// Hardware address.
    pub address: String,
    /// Latest non-empty advertised name.
    pub name: Option<String>,
    /// Last accepted signal strength in dBm.
    pub rssi: i16,
    /// Monotonic time of the last accepted RSSI update.
    pub last_rssi_update: Instant,
    /// Wall-clock time of the first sighting.
    pub first_seen: DateTime<Utc>,
    /// Wall-clock time of the latest sighting.
    pub last_seen: DateTime<Utc>,
    /// Sightings received, including the first.
    pub sightings: u64,
}

impl RemoteDevice {
    fn new(address: String, name: Option<String>, rssi: i16, now: Instant) -> Self {
        let seen = Utc::now();
        Self {
            address,
            name,
            rssi,
            last_rssi_update: now,
            first_seen: seen,
            last_seen: seen,
            sightings: 1,
        }
    }

    /// Name to show, falling back to the address.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }

    /// Rough distance in metres derived from the RSSI.
    pub fn estimated_distance_m(&self) -> f64 {
        estimate_distance(self.rssi)
    }
}

impl PartialEq for RemoteDevice {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for RemoteDevice {}

impl std::hash::Hash for RemoteDevice {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

/// Change to the cache contents.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A new address was seen.
    DeviceAdded(RemoteDevice),
    /// A known device's RSSI was updated.
    DeviceChanged(RemoteDevice),
    /// The cache was cleared.
    Reset,
}

/// What a sighting did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SightingOutcome {
    /// New entry created.
    Added,
    /// RSSI updated.
    Changed,
    /// Nothing consumers need to hear about.
    Unchanged,
}

#[derive(Default)]
struct CacheState {
    devices: Vec<RemoteDevice>,
    index: HashMap<String, usize>,
}

/// Set of currently visible devices, deduplicated by address.
pub struct DiscoveryCache {
    state: Mutex<CacheState>,
    debounce: Duration,
    event_tx: broadcast::Sender<DiscoveryEvent>,
}

impl Default for DiscoveryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryCache {
    /// Create a cache with the default 1000 ms RSSI debounce.
    pub fn new() -> Self {
        Self::with_debounce(DEFAULT_RSSI_DEBOUNCE)
    }

    /// Create a cache with a custom RSSI debounce.
    pub fn with_debounce(debounce: Duration) -> Self {
        let (event_tx, _) = broadcast::channel(256);

        Self {
            state: Mutex::new(CacheState::default()),
            debounce,
            event_tx,
        }
    }

    /// Record a sighting observed at `now`.
    pub fn on_sighting(
        &self,
        address: &str,
        name: Option<&str>,
        rssi: i16,
        now: Instant,
    ) -> SightingOutcome {
        let name = name.filter(|n| !n.is_empty());
        let mut state = self.state.lock();

        let Some(&slot) = state.index.get(address) else {
            let device =
                RemoteDevice::new(address.to_string(), name.map(str::to_string), rssi, now);
            debug!(
                "Discovered device {} ({:?}) at {} dBm",
                address, device.name, rssi
            );
            let slot = state.devices.len();
            state.index.insert(address.to_string(), slot);
            state.devices.push(device.clone());
            let _ = self.event_tx.send(DiscoveryEvent::DeviceAdded(device));
            return SightingOutcome::Added;
        };

        let device = &mut state.devices[slot];
        device.sightings += 1;
        device.last_seen = Utc::now();
        if let Some(name) = name {
            if device.name.as_deref() != Some(name) {
                trace!("Device {} renamed to {}", address, name);
                device.name = Some(name.to_string());
            }
        }

        let elapsed = now.saturating_duration_since(device.last_rssi_update);
        if rssi != device.rssi && elapsed > self.debounce {
            trace!("Device {} RSSI {} -> {} dBm", address, device.rssi, rssi);
            device.rssi = rssi;
            device.last_rssi_update = now;
            let _ = self
                .event_tx
                .send(DiscoveryEvent::DeviceChanged(device.clone()));
            SightingOutcome::Changed
        } else {
            SightingOutcome::Unchanged
        }
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        debug!("Clearing {} discovered devices", state.devices.len());
        state.devices.clear();
        state.index.clear();
        let _ = self.event_tx.send(DiscoveryEvent::Reset);
    }

    /// Snapshot of all devices in discovery order.
    pub fn devices(&self) -> Vec<RemoteDevice> {
        self.state.lock().devices.clone()
    }

    /// Snapshot of one device.
    pub fn get(&self, address: &str) -> Option<RemoteDevice> {
        let state = self.state.lock();
        state
            .index
            .get(address)
            .map(|&slot| state.devices[slot].clone())
    }

    /// Device with the strongest signal.
    pub fn strongest(&self) -> Option<RemoteDevice> {
        self.state
            .lock()
            .devices
            .iter()
            .max_by_key(|d| d.rssi)
            .cloned()
    }

    /// Number of known devices.
    pub fn len(&self) -> usize {
        self.state.lock().devices.len()
    }

    /// Check if no device is known.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to cache events.
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.event_tx.subscribe()
    }
}
