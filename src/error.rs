//! Error types for the gattlink crate.

use thiserror::Error;

use crate::protocol::GattStatus;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No Bluetooth hardware or driver is present.
    #[error("Bluetooth adapter not available")]
    AdapterUnavailable,

    /// The Bluetooth adapter exists but is switched off.
    #[error("Bluetooth adapter disabled")]
    AdapterDisabled,

    /// A scan, connection or GATT operation of the same kind is already running.
    #[error("Operation already in progress: {operation}")]
    AlreadyInProgress {
        /// The operation that was rejected.
        operation: String,
    },

    /// The operation needs a ready connection (or a serving server).
    #[error("Not connected")]
    NotConnected,

    /// The attribute's property bitmask lacks the needed capability.
    #[error("Operation not supported: {operation}")]
    UnsupportedOperation {
        /// Description of the unsupported operation.
        operation: String,
    },

    /// The platform refused a request or reported a non-success status.
    #[error("Platform rejected {operation}: {status}")]
    PlatformRejected {
        /// The operation the platform rejected.
        operation: String,
        /// The GATT status reported by the platform.
        status: GattStatus,
    },

    /// The peer dropped the link mid-operation.
    #[error("Peer disconnected")]
    Disconnected,

    /// A caller-imposed wait expired.
    #[error("Operation timed out")]
    Timeout,

    /// Service not found in the discovered or registered profile.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// Descriptor not found on the characteristic.
    #[error("Descriptor not found: {uuid}")]
    DescriptorNotFound {
        /// The UUID of the descriptor that was not found.
        uuid: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// A string could not be interpreted as a Bluetooth UUID.
    #[error("Invalid UUID: {value}")]
    InvalidUuid {
        /// The rejected text.
        value: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn in_progress(operation: impl Into<String>) -> Self {
        Self::AlreadyInProgress {
            operation: operation.into(),
        }
    }

    pub(crate) fn unsupported(operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    pub(crate) fn rejected(operation: impl Into<String>, status: GattStatus) -> Self {
        Self::PlatformRejected {
            operation: operation.into(),
            status,
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::rejected("write", GattStatus::WRITE_NOT_PERMITTED);
        assert_eq!(
            err.to_string(),
            "Platform rejected write: WRITE_NOT_PERMITTED (0x0003)"
        );
        assert_eq!(Error::NotConnected.to_string(), "Not connected");
    }
}
