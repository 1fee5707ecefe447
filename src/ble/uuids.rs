//! Bluetooth UUID constants and short-form conversions.
//!
//! 16-bit and 32-bit SIG-assigned UUIDs are shorthand for 128-bit values
//! built on the Bluetooth base UUID `00000000-0000-1000-8000-00805f9b34fb`:
//! `xxxx` expands to `0000xxxx-0000-1000-8000-00805f9b34fb`.

use uuid::Uuid;

use crate::error::{Error, Result};

/// The Bluetooth base UUID.
pub const BLUETOOTH_BASE_UUID: Uuid = Uuid::from_u128(0x0000_0000_0000_1000_8000_00805f9b34fb);

/// Bits of a 128-bit UUID that are fixed by the base UUID.
const BASE_MASK: u128 = (1u128 << 96) - 1;

// Generic services
/// Generic Access service.
pub const GENERIC_ACCESS_SERVICE_UUID: Uuid = uuid_from_u16(0x1800);
/// Generic Attribute service.
pub const GENERIC_ATTRIBUTE_SERVICE_UUID: Uuid = uuid_from_u16(0x1801);
/// Device Information service.
pub const DEVICE_INFO_SERVICE_UUID: Uuid = uuid_from_u16(0x180a);
/// Battery service.
pub const BATTERY_SERVICE_UUID: Uuid = uuid_from_u16(0x180f);

// Characteristics
/// Device Name characteristic.
pub const DEVICE_NAME_UUID: Uuid = uuid_from_u16(0x2a00);
/// Manufacturer Name String characteristic.
pub const MANUFACTURER_NAME_UUID: Uuid = uuid_from_u16(0x2a29);
/// Battery Level characteristic.
pub const BATTERY_LEVEL_UUID: Uuid = uuid_from_u16(0x2a19);

// Descriptors
/// Characteristic User Description descriptor.
pub const USER_DESCRIPTION_UUID: Uuid = uuid_from_u16(0x2901);
/// Client Characteristic Configuration descriptor (CCCD).
pub const CLIENT_CHARACTERISTIC_CONFIG_UUID: Uuid = uuid_from_u16(0x2902);

/// Expand a 16-bit short UUID onto the Bluetooth base UUID.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    uuid_from_u32(short as u32)
}

/// Expand a 32-bit short UUID onto the Bluetooth base UUID.
pub const fn uuid_from_u32(short: u32) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID.as_u128() | ((short as u128) << 96))
}

/// Check if a UUID lies on the Bluetooth base UUID.
pub fn is_base_uuid(uuid: &Uuid) -> bool {
    uuid.as_u128() & BASE_MASK == BLUETOOTH_BASE_UUID.as_u128()
}

/// Recover the 16-bit form of a UUID.
///
/// Returns `None` unless every bit outside the 16-bit slot matches the base UUID.
pub fn uuid_to_u16(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    if is_base_uuid(uuid) && value >> 112 == 0 {
        Some((value >> 96) as u16)
    } else {
        None
    }
}

/// Recover the 32-bit form of a UUID.
pub fn uuid_to_u32(uuid: &Uuid) -> Option<u32> {
    if is_base_uuid(uuid) {
        Some((uuid.as_u128() >> 96) as u32)
    } else {
        None
    }
}

/// Parse a UUID written as 4 hex digits, 8 hex digits, or the full 128-bit form.
pub fn parse_uuid(text: &str) -> Result<Uuid> {
    let text = text.trim();
    let invalid = || Error::InvalidUuid {
        value: text.to_string(),
    };

    match text.len() {
        4 => u16::from_str_radix(text, 16)
            .map(uuid_from_u16)
            .map_err(|_| invalid()),
        8 => u32::from_str_radix(text, 16)
            .map(uuid_from_u32)
            .map_err(|_| invalid()),
        _ => Uuid::parse_str(text).map_err(|_| invalid()),
    }
}

/// Render a UUID in its shortest form: `xxxx` for base UUIDs that fit in
/// 16 bits, otherwise the lowercase hyphenated 128-bit form.
pub fn short_form(uuid: &Uuid) -> String {
    match uuid_to_u16(uuid) {
        Some(short) => format!("{:04x}", short),
        None => uuid.hyphenated().to_string(),
    }
}
