//! Platform adapter seam.
//!
//! The engine never talks to a radio directly. It issues requests through
//! [`CentralAdapter`] and [`PeripheralAdapter`] and learns the outcome later,
//! when the platform binding feeds a [`CentralCallback`] or [`ServerCallback`]
//! back into the owning session.
//!
//! Adapter methods only *issue* a request. They return `Ok(())` when the
//! platform accepted it and must never call back into the session from the
//! same call stack: sessions hold their lock while issuing requests.

use uuid::Uuid;

use crate::ble::advertising::Advertisement;
use crate::ble::gatt::{AttributePath, GattService, WriteType};
use crate::error::Result;
use crate::protocol::GattStatus;

/// Availability of the local Bluetooth adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterState {
    /// No hardware or driver.
    Unavailable,
    /// Hardware present but powered off.
    Disabled,
    /// Ready for use.
    Enabled,
}

/// Scan API offered by the platform. Chosen once, never per scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScanApi {
    /// Scanner with parsed scan records and filters.
    #[default]
    Modern,
    /// Older callback-per-advertisement scanner.
    Legacy,
}

impl std::fmt::Display for ScanApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Modern => write!(f, "modern"),
            Self::Legacy => write!(f, "legacy"),
        }
    }
}

/// One advertisement received while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    /// Hardware address of the advertiser.
    pub address: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Received signal strength in dBm.
    pub rssi: i16,
}

/// Platform primitives used by the central (client) role.
#[cfg_attr(test, mockall::automock)]
pub trait CentralAdapter: Send + Sync {
    /// Current adapter availability.
    fn state(&self) -> AdapterState;

    /// Scan API the platform supports.
    fn scan_api(&self) -> ScanApi;

    /// Begin delivering sightings.
    fn start_scan(&self) -> Result<()>;

    /// Stop delivering sightings.
    fn stop_scan(&self) -> Result<()>;

    /// Open a link. Completion: [`CentralCallback::ConnectionStateChanged`].
    fn connect(&self, address: &str) -> Result<()>;

    /// Release a link. No callback follows a locally requested disconnect.
    fn disconnect(&self, address: &str) -> Result<()>;

    /// Enumerate the remote profile. Completion: [`CentralCallback::ServicesDiscovered`].
    fn discover_services(&self, address: &str) -> Result<()>;

    /// Read a value. Completion: [`CentralCallback::CharacteristicRead`].
    fn read_characteristic(&self, address: &str, path: &AttributePath) -> Result<()>;

    /// Write one transmission unit. Completion: [`CentralCallback::CharacteristicWrite`].
    fn write_characteristic(
        &self,
        address: &str,
        path: &AttributePath,
        value: &[u8],
        write_type: WriteType,
    ) -> Result<()>;

    /// Toggle local delivery of value changes for a characteristic.
    fn set_notification_enabled(
        &self,
        address: &str,
        path: &AttributePath,
        enabled: bool,
    ) -> Result<()>;

    /// Write a descriptor. Completion: [`CentralCallback::DescriptorWrite`].
    fn write_descriptor(&self, address: &str, path: &AttributePath, value: &[u8]) -> Result<()>;
}

/// Platform primitives used by the peripheral (server) role.
#[cfg_attr(test, mockall::automock)]
pub trait PeripheralAdapter: Send + Sync {
    /// Current adapter availability.
    fn state(&self) -> AdapterState;

    /// Whether the controller can advertise.
    fn supports_advertising(&self) -> bool;

    /// Open the local GATT server.
    fn open_server(&self) -> Result<()>;

    /// Close the local GATT server.
    fn close_server(&self) -> Result<()>;

    /// Register a service. Completion: [`ServerCallback::ServiceAdded`].
    fn add_service(&self, service: &GattService) -> Result<()>;

    /// Begin advertising. Completion: [`ServerCallback::AdvertisingStarted`]
    /// or [`ServerCallback::AdvertisingFailed`].
    fn start_advertising(&self, advertisement: &Advertisement) -> Result<()>;

    /// Stop advertising.
    fn stop_advertising(&self) -> Result<()>;

    /// Answer a request.
    fn send_response(
        &self,
        device: &str,
        request_id: u32,
        status: GattStatus,
        offset: u16,
        value: &[u8],
    ) -> Result<()>;

    /// Push one transmission unit. Completion: [`ServerCallback::NotificationSent`].
    fn notify_changed(
        &self,
        device: &str,
        path: &AttributePath,
        value: &[u8],
        confirm: bool,
    ) -> Result<()>;
}

/// Asynchronous outcome reported by the platform to a client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralCallback {
    /// Link state changed.
    ConnectionStateChanged {
        /// Remote address.
        address: String,
        /// Platform status.
        status: GattStatus,
        /// Whether the link is now up.
        connected: bool,
    },
    /// Service discovery finished.
    ServicesDiscovered {
        /// Remote address.
        address: String,
        /// Platform status.
        status: GattStatus,
        /// Discovered profile.
        services: Vec<GattService>,
    },
    /// A read finished.
    CharacteristicRead {
        /// Remote address.
        address: String,
        /// Characteristic read.
        path: AttributePath,
        /// Platform status.
        status: GattStatus,
        /// Value returned.
        value: Vec<u8>,
    },
    /// A write finished.
    CharacteristicWrite {
        /// Remote address.
        address: String,
        /// Characteristic written.
        path: AttributePath,
        /// Platform status.
        status: GattStatus,
    },
    /// A descriptor write finished.
    DescriptorWrite {
        /// Remote address.
        address: String,
        /// Descriptor written.
        path: AttributePath,
        /// Platform status.
        status: GattStatus,
    },
    /// The peer pushed a new value.
    CharacteristicChanged {
        /// Remote address.
        address: String,
        /// Characteristic that changed.
        path: AttributePath,
        /// New value.
        value: Vec<u8>,
    },
    /// The link MTU changed.
    MtuChanged {
        /// Remote address.
        address: String,
        /// New ATT MTU.
        mtu: u16,
    },
}

impl CentralCallback {
    /// Remote address the callback concerns.
    pub fn address(&self) -> &str {
        match self {
            Self::ConnectionStateChanged { address, .. }
            | Self::ServicesDiscovered { address, .. }
            | Self::CharacteristicRead { address, .. }
            | Self::CharacteristicWrite { address, .. }
            | Self::DescriptorWrite { address, .. }
            | Self::CharacteristicChanged { address, .. }
            | Self::MtuChanged { address, .. } => address,
        }
    }
}

/// Asynchronous event reported by the platform to a server session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCallback {
    /// A central connected or disconnected.
    ConnectionStateChanged {
        /// Remote address.
        device: String,
        /// Platform status.
        status: GattStatus,
        /// Whether the link is now up.
        connected: bool,
    },
    /// Service registration finished.
    ServiceAdded {
        /// Platform status.
        status: GattStatus,
        /// Service UUID.
        service: Uuid,
    },
    /// Advertising is running.
    AdvertisingStarted,
    /// Advertising could not start.
    AdvertisingFailed {
        /// Platform error code.
        code: i32,
    },
    /// A central reads a characteristic.
    CharacteristicReadRequest {
        /// Remote address.
        device: String,
        /// Request identifier to echo in the response.
        request_id: u32,
        /// Read offset.
        offset: u16,
        /// Characteristic.
        path: AttributePath,
    },
    /// A central writes a characteristic.
    CharacteristicWriteRequest {
        /// Remote address.
        device: String,
        /// Request identifier to echo in the response.
        request_id: u32,
        /// Characteristic.
        path: AttributePath,
        /// Part of a prepared (queued) write.
        prepared: bool,
        /// Whether the central waits for a response.
        response_needed: bool,
        /// Write offset.
        offset: u16,
        /// Written value.
        value: Vec<u8>,
    },
    /// A central reads a descriptor.
    DescriptorReadRequest {
        /// Remote address.
        device: String,
        /// Request identifier to echo in the response.
        request_id: u32,
        /// Read offset.
        offset: u16,
        /// Descriptor.
        path: AttributePath,
    },
    /// A central writes a descriptor.
    DescriptorWriteRequest {
        /// Remote address.
        device: String,
        /// Request identifier to echo in the response.
        request_id: u32,
        /// Descriptor.
        path: AttributePath,
        /// Part of a prepared (queued) write.
        prepared: bool,
        /// Whether the central waits for a response.
        response_needed: bool,
        /// Write offset.
        offset: u16,
        /// Written value.
        value: Vec<u8>,
    },
    /// A central commits or cancels prepared writes.
    ExecuteWrite {
        /// Remote address.
        device: String,
        /// Request identifier to echo in the response.
        request_id: u32,
        /// Commit (true) or cancel (false).
        execute: bool,
    },
    /// The platform finished sending one notification or indication.
    NotificationSent {
        /// Remote address.
        device: String,
        /// Platform status.
        status: GattStatus,
    },
    /// A link's MTU changed.
    MtuChanged {
        /// Remote address.
        device: String,
        /// New ATT MTU.
        mtu: u16,
    },
}
