//! Client Characteristic Configuration descriptor values.

/// Value written to a CCCD (descriptor 0x2902) to control server pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClientConfiguration {
    /// Pushes disabled.
    Disabled,
    /// Unacknowledged notifications enabled.
    Notify,
    /// Acknowledged indications enabled.
    Indicate,
}

impl ClientConfiguration {
    /// `DISABLE_NOTIFICATION_VALUE`.
    pub const DISABLE_VALUE: [u8; 2] = [0x00, 0x00];
    /// `ENABLE_NOTIFICATION_VALUE`.
    pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
    /// `ENABLE_INDICATION_VALUE`.
    pub const ENABLE_INDICATION_VALUE: [u8; 2] = [0x02, 0x00];

    /// Parse a descriptor value. Only the exact two-byte sentinels are accepted.
    pub fn from_bytes(value: &[u8]) -> Option<Self> {
        match value {
            [0x00, 0x00] => Some(Self::Disabled),
            [0x01, 0x00] => Some(Self::Notify),
            [0x02, 0x00] => Some(Self::Indicate),
            _ => None,
        }
    }

    /// Encode as the descriptor value.
    pub fn to_bytes(self) -> [u8; 2] {
        match self {
            Self::Disabled => Self::DISABLE_VALUE,
            Self::Notify => Self::ENABLE_NOTIFICATION_VALUE,
            Self::Indicate => Self::ENABLE_INDICATION_VALUE,
        }
    }

    /// Check if pushes are enabled.
    pub fn is_enabled(self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Check if the peer must acknowledge each push.
    pub fn requires_confirmation(self) -> bool {
        matches!(self, Self::Indicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(
            ClientConfiguration::from_bytes(&[1, 0]),
            Some(ClientConfiguration::Notify)
        );
        assert_eq!(
            ClientConfiguration::from_bytes(&[2, 0]),
            Some(ClientConfiguration::Indicate)
        );
        assert_eq!(
            ClientConfiguration::from_bytes(&[0, 0]),
            Some(ClientConfiguration::Disabled)
        );
        assert_eq!(ClientConfiguration::from_bytes(&[1]), None);
        assert_eq!(ClientConfiguration::from_bytes(&[3, 0]), None);
    }

    #[test]
    fn test_flags() {
        assert!(ClientConfiguration::Indicate.requires_confirmation());
        assert!(!ClientConfiguration::Notify.requires_confirmation());
        assert!(!ClientConfiguration::Disabled.is_enabled());
        assert_eq!(ClientConfiguration::Notify.to_bytes(), [1, 0]);
    }
}
