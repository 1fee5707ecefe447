//! BLE module.
//!
//! Platform seam, GATT data model, advertising payloads, scanning and the
//! discovery cache.

pub mod adapter;
pub mod advertising;
pub mod discovery;
pub mod gatt;
pub mod platform;
pub mod registry;
pub mod scanner;
pub mod uuids;

pub use adapter::{
    AdapterState, CentralAdapter, CentralCallback, PeripheralAdapter, ScanApi, ServerCallback,
    Sighting,
};
pub use advertising::{AdvertiseData, AdvertiseMode, AdvertiseSettings, Advertisement, TxPowerLevel};
pub use discovery::{DiscoveryCache, DiscoveryEvent, RemoteDevice, SightingOutcome};
pub use gatt::{
    AttributePath, CharProperties, GattCharacteristic, GattDescriptor, GattService, WriteType,
};
pub use platform::{BtleplugCentral, CentralChannels};
pub use registry::AttributeRegistry;
pub use scanner::{ScanController, ScanEvent, ScanState};
pub use uuids::*;
