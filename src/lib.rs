// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # gattlink
//!
//! A Bluetooth Low Energy GATT engine for both roles: a client (central)
//! that scans, connects, reads, writes and subscribes, and a server
//! (peripheral) that advertises one service, answers requests and pushes
//! notifications to subscribed centrals.
//!
//! ## Features
//!
//! - **Discovery**: Scan with a fixed timeout and an RSSI-debounced device cache
//! - **Client Session**: Connection state machine with one GATT operation in flight
//! - **Server Session**: Request dispatch, CCCD tracking and flow-controlled pushes
//! - **Fragmentation**: Payloads split into chunks that fit the link MTU
//! - **Platform Seam**: Adapter traits, with a `btleplug` binding for the central role
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gattlink::ble::uuids::{BATTERY_LEVEL_UUID, BATTERY_SERVICE_UUID};
//! use gattlink::{DeviceManager, Result};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = DeviceManager::new().await?;
//!     manager.start_scanning()?;
//!
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!
//!     if let Some(device) = manager.get_nearest_device() {
//!         println!("Nearest: {} ({} dBm)", device.display_name(), device.rssi);
//!
//!         manager.connect(&device.address, Duration::from_secs(10)).await?;
//!         let level = manager
//!             .client()
//!             .read_value(BATTERY_SERVICE_UUID, BATTERY_LEVEL_UUID, Duration::from_secs(5))
//!             .await?;
//!         println!("Battery: {:?}", level);
//!     }
//!
//!     manager.shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! The peripheral role has no bundled binding; implement
//! [`PeripheralAdapter`] over the platform's GATT server API.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for configuration types

// Public modules
pub mod ble;
pub mod callback;
pub mod client;
pub mod config;
pub mod device_manager;
pub mod error;
pub mod protocol;
pub mod server;
pub mod utils;

// Re-exports for convenience
pub use callback::CallbackHandle;
pub use client::{ClientEvent, ClientSession, ClientState, GattOperation};
pub use config::{EngineConfig, ScanConfig, ServerConfig, TransportConfig};
pub use device_manager::DeviceManager;
pub use error::{Error, Result};
pub use server::{
    HandlerResult, RequestHandler, RequestKind, ServerEvent, ServerSession, ServerState,
    ValueStore,
};
pub use utils::{bytes_to_hex, estimate_distance};

// Re-export commonly used types from submodules
pub use ble::adapter::{
    AdapterState, CentralAdapter, CentralCallback, PeripheralAdapter, ScanApi, ServerCallback,
    Sighting,
};
pub use ble::advertising::{AdvertiseData, AdvertiseSettings, Advertisement};
pub use ble::discovery::{DiscoveryCache, DiscoveryEvent, RemoteDevice};
pub use ble::gatt::{
    AttributePath, CharProperties, GattCharacteristic, GattDescriptor, GattService, WriteType,
};
pub use ble::registry::AttributeRegistry;
pub use ble::scanner::{ScanController, ScanEvent, ScanState};
pub use protocol::{ClientConfiguration, GattStatus};
