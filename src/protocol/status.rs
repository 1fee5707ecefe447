//! GATT status codes.
//!
//! Values follow the ATT error codes from the Bluetooth Core specification
//! (Vol 3, Part F, 3.4.1.1) plus the generic platform failure code used by
//! most host stacks.

/// Status reported by the platform in every asynchronous GATT callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GattStatus(pub u16);

impl GattStatus {
    /// The operation completed successfully.
    pub const SUCCESS: Self = Self(0x0000);
    /// The attribute cannot be read.
    pub const READ_NOT_PERMITTED: Self = Self(0x0002);
    /// The attribute cannot be written.
    pub const WRITE_NOT_PERMITTED: Self = Self(0x0003);
    /// The link is not authenticated.
    pub const INSUFFICIENT_AUTHENTICATION: Self = Self(0x0005);
    /// The server does not support the request.
    pub const REQUEST_NOT_SUPPORTED: Self = Self(0x0006);
    /// The offset is past the end of the attribute value.
    pub const INVALID_OFFSET: Self = Self(0x0007);
    /// The value length is invalid for this attribute.
    pub const INVALID_ATTRIBUTE_LENGTH: Self = Self(0x000d);
    /// The link is encrypted with an insufficient key size.
    pub const INSUFFICIENT_ENCRYPTION: Self = Self(0x000f);
    /// The remote device is busy with earlier traffic.
    pub const CONNECTION_CONGESTED: Self = Self(0x008f);
    /// Generic platform failure.
    pub const FAILURE: Self = Self(0x0101);

    /// Check if this status reports success.
    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }

    /// Symbolic name of a known status.
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::SUCCESS => "SUCCESS",
            Self::READ_NOT_PERMITTED => "READ_NOT_PERMITTED",
            Self::WRITE_NOT_PERMITTED => "WRITE_NOT_PERMITTED",
            Self::INSUFFICIENT_AUTHENTICATION => "INSUFFICIENT_AUTHENTICATION",
            Self::REQUEST_NOT_SUPPORTED => "REQUEST_NOT_SUPPORTED",
            Self::INVALID_OFFSET => "INVALID_OFFSET",
            Self::INVALID_ATTRIBUTE_LENGTH => "INVALID_ATTRIBUTE_LENGTH",
            Self::INSUFFICIENT_ENCRYPTION => "INSUFFICIENT_ENCRYPTION",
            Self::CONNECTION_CONGESTED => "CONNECTION_CONGESTED",
            Self::FAILURE => "FAILURE",
            _ => return None,
        };
        Some(name)
    }
}

impl std::fmt::Display for GattStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({:#06x})", name, self.0),
            None => write!(f, "status {:#06x}", self.0),
        }
    }
}
