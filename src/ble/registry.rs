//! Human-readable labels for well-known GATT attributes.
//!
//! The registry is built once and shared read-only (`Arc<AttributeRegistry>`).
//! It is only used to label services, characteristics and descriptors in
//! diagnostics; no engine decision depends on it.

use std::collections::HashMap;
use uuid::Uuid;

use crate::ble::uuids::{short_form, uuid_from_u16};

/// SIG-assigned 16-bit numbers and their names.
const STANDARD_ATTRIBUTES: &[(u16, &str)] = &[
    // Services
    (0x1800, "Generic Access"),
    (0x1801, "Generic Attribute"),
    (0x1802, "Immediate Alert"),
    (0x1803, "Link Loss"),
    (0x1804, "Tx Power"),
    (0x1805, "Current Time Service"),
    (0x1806, "Reference Time Update Service"),
    (0x1807, "Next DST Change Service"),
    (0x1808, "Glucose"),
    (0x1809, "Health Thermometer"),
    (0x180a, "Device Information"),
    (0x180b, "Network Availability"),
    (0x180d, "Heart Rate"),
    (0x180e, "Phone Alert Status Service"),
    (0x180f, "Battery Service"),
    (0x1810, "Blood Pressure"),
    (0x1811, "Alert Notification Service"),
    (0x1812, "Human Interface Device"),
    (0x1813, "Scan Parameters"),
    (0x1814, "Running Speed and Cadence"),
    (0x1816, "Cycling Speed and Cadence"),
    (0x1818, "Cycling Power"),
    (0x1819, "Location and Navigation"),
    // Units
    (0x2700, "GATT_UNITLESS"),
    (0x2701, "GATT_UNIT_LENGTH_METER"),
    (0x2702, "GATT_UNIT_MASS_KGRAM"),
    (0x2703, "GATT_UNIT_TIME_SECOND"),
    (0x2704, "GATT_UNIT_ELECTRIC_CURRENT_A"),
    (0x2705, "GATT_UNIT_THERMODYNAMIC_TEMP_K"),
    (0x2706, "GATT_UNIT_AMOUNT_SUBSTANCE_M"),
    // Declarations
    (0x2800, "Primary Service"),
    (0x2801, "Secondary Service"),
    (0x2802, "Include"),
    (0x2803, "Characteristic"),
    // Descriptors
    (0x2900, "Characteristic Extended Properties"),
    (0x2901, "Characteristic User Description"),
    (0x2902, "Client Characteristic Configuration"),
    (0x2903, "Server Characteristic Configuration"),
    (0x2904, "Characteristic Presentation Format"),
    (0x2905, "Characteristic Aggregate Format"),
    (0x2906, "Valid Range"),
    (0x2907, "External Report Reference Descriptor"),
    (0x2908, "Report Reference Descriptor"),
    // Characteristics
    (0x2a00, "Device Name"),
    (0x2a01, "Appearance"),
    (0x2a02, "Peripheral Privacy Flag"),
    (0x2a03, "Reconnection Address"),
    (0x2a04, "PPCP"),
    (0x2a05, "Service Changed"),
    (0x2a19, "Battery Level"),
    (0x2a23, "System ID"),
    (0x2a24, "Model Number String"),
    (0x2a25, "Serial Number String"),
    (0x2a26, "Firmware Revision String"),
    (0x2a27, "Hardware Revision String"),
    (0x2a28, "Software Revision String"),
    (0x2a29, "Manufacturer Name String"),
    (0x2a37, "Heart Rate Measurement"),
    (0x2a38, "Body Sensor Location"),
];

/// Immutable UUID → label lookup.
#[derive(Debug, Clone, Default)]
pub struct AttributeRegistry {
    labels: HashMap<Uuid, String>,
}

impl AttributeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the standard SIG attribute names.
    pub fn standard() -> Self {
        STANDARD_ATTRIBUTES
            .iter()
            .map(|(short, label)| (uuid_from_u16(*short), label.to_string()))
            .collect()
    }

    /// Return a copy of this registry extended with application-specific labels.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (Uuid, S)>,
        S: Into<String>,
    {
        self.labels
            .extend(labels.into_iter().map(|(uuid, label)| (uuid, label.into())));
        self
    }

    /// Look up the label for a UUID.
    pub fn label(&self, uuid: &Uuid) -> Option<&str> {
        self.labels.get(uuid).map(String::as_str)
    }

    /// Label with a fallback, e.g. `"Battery Service (180f)"` or `"Unknown (…)"`.
    pub fn describe(&self, uuid: &Uuid) -> String {
        match self.label(uuid) {
            Some(label) => format!("{} ({})", label, short_form(uuid)),
            None => format!("Unknown ({})", short_form(uuid)),
        }
    }

    /// Number of known labels.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl FromIterator<(Uuid, String)> for AttributeRegistry {
    fn from_iter<T: IntoIterator<Item = (Uuid, String)>>(iter: T) -> Self {
        Self {
            labels: iter.into_iter().collect(),
        }
    }
}
