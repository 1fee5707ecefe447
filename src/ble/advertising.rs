//! Advertising configuration for the peripheral role.
//!
//! Describes what the local server broadcasts and how. Payload sizes are
//! checked against the 31-byte legacy advertising budget before the adapter
//! is asked to advertise.

use std::time::Duration;
use uuid::Uuid;

use crate::ble::uuids::uuid_to_u16;
use crate::error::{Error, Result};

/// Maximum legacy advertising (or scan response) payload.
pub const MAX_LEGACY_PAYLOAD: usize = 31;

/// Longest advertising duration a platform accepts; `None` means unlimited.
pub const MAX_ADVERTISE_TIMEOUT: Duration = Duration::from_secs(180);

/// Encoded size of the Flags AD structure.
const AD_FLAGS_LEN: usize = 3;

/// Trade-off between advertising interval and power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdvertiseMode {
    /// Longest interval, lowest power.
    LowPower,
    /// Balanced interval.
    #[default]
    Balanced,
    /// Shortest interval, highest power.
    LowLatency,
}

/// Transmit power level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TxPowerLevel {
    /// Lowest available power.
    UltraLow,
    /// Low power.
    Low,
    /// Medium power.
    #[default]
    Medium,
    /// High power.
    High,
}

/// How the platform advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertiseSettings {
    /// Interval/power trade-off.
    pub mode: AdvertiseMode,
    /// Transmit power.
    pub tx_power: TxPowerLevel,
    /// Whether centrals may connect. Must be true for a GATT server to be reachable.
    pub connectable: bool,
    /// Stop advertising after this long.
    pub timeout: Option<Duration>,
}

impl Default for AdvertiseSettings {
    fn default() -> Self {
        Self {
            mode: AdvertiseMode::LowLatency,
            tx_power: TxPowerLevel::High,
            connectable: true,
            timeout: None,
        }
    }
}

/// Content of an advertising packet or scan response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdvertiseData {
    /// Local name to include.
    pub local_name: Option<String>,
    /// Include the TX power level field.
    pub include_tx_power: bool,
    /// Manufacturer specific data by company identifier.
    pub manufacturer_data: Vec<(u16, Vec<u8>)>,
    /// Advertised service UUIDs.
    pub service_uuids: Vec<Uuid>,
    /// Service data by service UUID.
    pub service_data: Vec<(Uuid, Vec<u8>)>,
}

impl AdvertiseData {
    /// Create empty advertising data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Include a local name.
    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    /// Include the TX power level.
    pub fn with_tx_power(mut self) -> Self {
        self.include_tx_power = true;
        self
    }

    /// Add manufacturer specific data.
    pub fn with_manufacturer_data(mut self, company_id: u16, data: impl Into<Vec<u8>>) -> Self {
        self.manufacturer_data.push((company_id, data.into()));
        self
    }

    /// Advertise a service UUID.
    pub fn with_service_uuid(mut self, uuid: Uuid) -> Self {
        self.service_uuids.push(uuid);
        self
    }

    /// Add service data.
    pub fn with_service_data(mut self, uuid: Uuid, data: impl Into<Vec<u8>>) -> Self {
        self.service_data.push((uuid, data.into()));
        self
    }

    /// Size of the encoded AD structures, excluding the Flags field.
    pub fn encoded_len(&self) -> usize {
        let mut len = 0;

        if let Some(name) = &self.local_name {
            len += 2 + name.len();
        }
        if self.include_tx_power {
            len += 3;
        }
        for (_, data) in &self.manufacturer_data {
            len += 2 + 2 + data.len();
        }

        let short = self
            .service_uuids
            .iter()
            .filter(|u| uuid_to_u16(u).is_some())
            .count();
        let long = self.service_uuids.len() - short;
        if short > 0 {
            len += 2 + 2 * short;
        }
        if long > 0 {
            len += 2 + 16 * long;
        }

        for (uuid, data) in &self.service_data {
            let uuid_len = if uuid_to_u16(uuid).is_some() { 2 } else { 16 };
            len += 2 + uuid_len + data.len();
        }

        len
    }
}

/// Everything the server advertises.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Advertisement {
    /// Advertising parameters.
    pub settings: AdvertiseSettings,
    /// Advertising packet content.
    pub data: AdvertiseData,
    /// Optional scan response content.
    pub scan_response: Option<AdvertiseData>,
}

impl Advertisement {
    /// Create with default settings.
    pub fn new(data: AdvertiseData) -> Self {
        Self {
            settings: AdvertiseSettings::default(),
            data,
            scan_response: None,
        }
    }

    /// Set the scan response.
    pub fn with_scan_response(mut self, scan_response: AdvertiseData) -> Self {
        self.scan_response = Some(scan_response);
        self
    }

    /// Replace the settings.
    pub fn with_settings(mut self, settings: AdvertiseSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Check payload sizes and settings.
    pub fn validate(&self) -> Result<()> {
        if let Some(timeout) = self.settings.timeout {
            if timeout > MAX_ADVERTISE_TIMEOUT {
                return Err(Error::InvalidParameter {
                    name: "advertise_timeout".to_string(),
                    value: format!("{:?}", timeout),
                });
            }
        }

        let flags = if self.settings.connectable {
            AD_FLAGS_LEN
        } else {
            0
        };
        let data_len = flags + self.data.encoded_len();
        if data_len > MAX_LEGACY_PAYLOAD {
            return Err(Error::InvalidParameter {
                name: "advertise_data".to_string(),
                value: format!("{} bytes", data_len),
            });
        }

        if let Some(scan_response) = &self.scan_response {
            let len = scan_response.encoded_len();
            if len > MAX_LEGACY_PAYLOAD {
                return Err(Error::InvalidParameter {
                    name: "scan_response".to_string(),
                    value: format!("{} bytes", len),
                });
            }
        }

        Ok(())
    }
}
