//! GATT attribute model.
//!
//! A service holds characteristics, a characteristic holds descriptors. The
//! same types describe both a profile discovered on a remote device and a
//! service published by the local server.

use uuid::Uuid;

use crate::ble::uuids::CLIENT_CHARACTERISTIC_CONFIG_UUID;
use crate::error::{Error, Result};

/// Characteristic property bitmask, as carried in the characteristic declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharProperties(pub u8);

impl CharProperties {
    /// Value may be broadcast in advertising data.
    pub const BROADCAST: Self = Self(0x01);
    /// Value may be read.
    pub const READ: Self = Self(0x02);
    /// Value may be written without a response.
    pub const WRITE_WITHOUT_RESPONSE: Self = Self(0x04);
    /// Value may be written with a response.
    pub const WRITE: Self = Self(0x08);
    /// Server may notify value changes.
    pub const NOTIFY: Self = Self(0x10);
    /// Server may indicate value changes.
    pub const INDICATE: Self = Self(0x20);
    /// Authenticated signed writes are allowed.
    pub const AUTHENTICATED_SIGNED_WRITES: Self = Self(0x40);
    /// Extended properties descriptor present.
    pub const EXTENDED_PROPERTIES: Self = Self(0x80);

    /// No properties.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Create from raw bitmask.
    pub const fn from_raw(value: u8) -> Self {
        Self(value)
    }

    /// Raw bitmask.
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Check if every bit of `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check if the value may be read.
    pub fn can_read(&self) -> bool {
        self.contains(Self::READ)
    }

    /// Check if the value may be written in either mode.
    pub fn can_write(&self) -> bool {
        self.contains(Self::WRITE) || self.contains(Self::WRITE_WITHOUT_RESPONSE)
    }

    /// Check if the server can push value changes.
    pub fn can_push(&self) -> bool {
        self.contains(Self::NOTIFY) || self.contains(Self::INDICATE)
    }
}

impl std::ops::BitOr for CharProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::fmt::Display for CharProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: [(CharProperties, &str); 8] = [
            (CharProperties::BROADCAST, "broadcast"),
            (CharProperties::READ, "read"),
            (CharProperties::WRITE_WITHOUT_RESPONSE, "write-no-response"),
            (CharProperties::WRITE, "write"),
            (CharProperties::NOTIFY, "notify"),
            (CharProperties::INDICATE, "indicate"),
            (CharProperties::AUTHENTICATED_SIGNED_WRITES, "signed-write"),
            (CharProperties::EXTENDED_PROPERTIES, "extended"),
        ];

        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "[{}]", names.join("|"))
    }
}

/// Write mode for a characteristic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteType {
    /// Acknowledged write.
    WithResponse,
    /// Unacknowledged write command.
    WithoutResponse,
}

impl WriteType {
    /// Pick the write mode a characteristic supports, preferring acknowledged writes.
    pub fn for_properties(properties: CharProperties) -> Option<Self> {
        if properties.contains(CharProperties::WRITE) {
            Some(Self::WithResponse)
        } else if properties.contains(CharProperties::WRITE_WITHOUT_RESPONSE) {
            Some(Self::WithoutResponse)
        } else {
            None
        }
    }
}

/// Location of an attribute: a characteristic, optionally one of its descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributePath {
    /// Owning service.
    pub service: Uuid,
    /// Characteristic.
    pub characteristic: Uuid,
    /// Descriptor, when the path names one.
    pub descriptor: Option<Uuid>,
}

impl AttributePath {
    /// Path to a characteristic value.
    pub fn characteristic(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
            descriptor: None,
        }
    }

    /// Path to a descriptor.
    pub fn descriptor(service: Uuid, characteristic: Uuid, descriptor: Uuid) -> Self {
        Self {
            service,
            characteristic,
            descriptor: Some(descriptor),
        }
    }

    /// The same characteristic's CCCD.
    pub fn cccd(&self) -> Self {
        Self::descriptor(
            self.service,
            self.characteristic,
            CLIENT_CHARACTERISTIC_CONFIG_UUID,
        )
    }

    /// Path of the owning characteristic.
    pub fn without_descriptor(&self) -> Self {
        Self::characteristic(self.service, self.characteristic)
    }
}

impl std::fmt::Display for AttributePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.service, self.characteristic)?;
        if let Some(descriptor) = &self.descriptor {
            write!(f, "/{}", descriptor)?;
        }
        Ok(())
    }
}

/// A descriptor attached to a characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattDescriptor {
    /// Descriptor UUID.
    pub uuid: Uuid,
    /// Static value, if any (server side only).
    pub value: Option<Vec<u8>>,
}

impl GattDescriptor {
    /// Create a descriptor with no static value.
    pub fn new(uuid: Uuid) -> Self {
        Self { uuid, value: None }
    }

    /// The Client Characteristic Configuration descriptor.
    pub fn cccd() -> Self {
        Self::new(CLIENT_CHARACTERISTIC_CONFIG_UUID)
    }
}

/// A characteristic and its descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Property bitmask.
    pub properties: CharProperties,
    /// Descriptors.
    pub descriptors: Vec<GattDescriptor>,
}

impl GattCharacteristic {
    /// Create a characteristic without descriptors.
    pub fn new(uuid: Uuid, properties: CharProperties) -> Self {
        Self {
            uuid,
            properties,
            descriptors: Vec::new(),
        }
    }

    /// Add a descriptor.
    pub fn with_descriptor(mut self, descriptor: GattDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Look up a descriptor.
    pub fn descriptor(&self, uuid: &Uuid) -> Option<&GattDescriptor> {
        self.descriptors.iter().find(|d| d.uuid == *uuid)
    }

    /// Check if a CCCD is present.
    pub fn has_cccd(&self) -> bool {
        self.descriptor(&CLIENT_CHARACTERISTIC_CONFIG_UUID).is_some()
    }
}

/// A service and its characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    /// Service UUID.
    pub uuid: Uuid,
    /// Primary or secondary service.
    pub primary: bool,
    /// Characteristics.
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    /// Create an empty primary service.
    pub fn primary(uuid: Uuid) -> Self {
        Self {
            uuid,
            primary: true,
            characteristics: Vec::new(),
        }
    }

    /// Add a characteristic.
    pub fn with_characteristic(mut self, characteristic: GattCharacteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    /// Look up a characteristic.
    pub fn characteristic(&self, uuid: &Uuid) -> Option<&GattCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == *uuid)
    }
}

/// Find a characteristic in a profile.
pub fn find_characteristic<'a>(
    services: &'a [GattService],
    service: &Uuid,
    characteristic: &Uuid,
) -> Result<&'a GattCharacteristic> {
    services
        .iter()
        .find(|s| s.uuid == *service)
        .ok_or_else(|| Error::ServiceNotFound {
            uuid: service.to_string(),
        })?
        .characteristic(characteristic)
        .ok_or_else(|| Error::CharacteristicNotFound {
            uuid: characteristic.to_string(),
        })
}
