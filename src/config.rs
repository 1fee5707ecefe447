//! Engine configuration.
//!
//! Every setting has a default matching common BLE hardware. Enable the
//! `serde` feature to load configurations from files.

use std::time::Duration;

use crate::ble::adapter::ScanApi;
use crate::error::{Error, Result};
use crate::protocol::DEFAULT_CHUNK_SIZE;

/// Fragmentation settings shared by both roles.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransportConfig {
    /// Largest value carried by one GATT operation.
    pub chunk_size: usize,
    /// Split outbound client writes into `chunk_size` units. Turn off when the
    /// platform stack already performs long writes.
    pub manual_chunking: bool,
    /// Adopt `mtu - 3` as the chunk size when the link reports a new MTU.
    pub follow_mtu: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            manual_chunking: true,
            follow_mtu: false,
        }
    }
}

impl TransportConfig {
    /// Set the chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Enable or disable manual chunking.
    pub fn with_manual_chunking(mut self, enabled: bool) -> Self {
        self.manual_chunking = enabled;
        self
    }

    /// Enable or disable MTU tracking.
    pub fn with_follow_mtu(mut self, enabled: bool) -> Self {
        self.follow_mtu = enabled;
        self
    }
}

/// Scan lifecycle settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanConfig {
    /// Force a scan API instead of asking the adapter.
    pub api: Option<ScanApi>,
    /// Scan duration on the modern API.
    pub modern_timeout: Duration,
    /// Scan duration on the legacy API.
    pub legacy_timeout: Duration,
    /// Minimum interval between RSSI updates of one device.
    pub rssi_debounce: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            api: None,
            modern_timeout: Duration::from_secs(60),
            legacy_timeout: Duration::from_secs(10),
            rssi_debounce: Duration::from_millis(1000),
        }
    }
}

impl ScanConfig {
    /// Scan duration for an API.
    pub fn timeout_for(&self, api: ScanApi) -> Duration {
        match api {
            ScanApi::Modern => self.modern_timeout,
            ScanApi::Legacy => self.legacy_timeout,
        }
    }
}

/// Peripheral role settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerConfig {
    /// Payloads allowed in one device's push backlog, the in-flight one included.
    pub max_pending_pushes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_pending_pushes: 8,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Fragmentation.
    pub transport: TransportConfig,
    /// Scanning.
    pub scan: ScanConfig,
    /// Peripheral role.
    pub server: ServerConfig,
}

impl EngineConfig {
    /// Check every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.transport.chunk_size == 0 {
            return Err(invalid("transport.chunk_size", self.transport.chunk_size));
        }
        if self.scan.modern_timeout.is_zero() {
            return Err(invalid(
                "scan.modern_timeout",
                format!("{:?}", self.scan.modern_timeout),
            ));
        }
        if self.scan.legacy_timeout.is_zero() {
            return Err(invalid(
                "scan.legacy_timeout",
                format!("{:?}", self.scan.legacy_timeout),
            ));
        }
        if self.server.max_pending_pushes == 0 {
            return Err(invalid(
                "server.max_pending_pushes",
                self.server.max_pending_pushes,
            ));
        }
        Ok(())
    }
}

fn invalid(name: &str, value: impl ToString) -> Error {
    Error::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
    }
}
