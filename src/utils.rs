//! Utility functions for the gattlink crate.

/// Measured RSSI at one metre used by [`estimate_distance`].
const RSSI_AT_ONE_METER: f64 = 60.0;

/// Path-loss exponent used by [`estimate_distance`].
const PATH_LOSS_EXPONENT: f64 = 2.0;

/// Render bytes as lowercase hex without separators.
///
/// # Example
///
/// ```
/// use gattlink::bytes_to_hex;
///
/// assert_eq!(bytes_to_hex(&[0x01, 0xab, 0xff]), "01abff");
/// ```
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Rough distance in metres from a signal strength, using the log-distance
/// path-loss model.
///
/// # Arguments
///
/// * `rssi` - Received signal strength in dBm
///
/// # Example
///
/// ```
/// use gattlink::estimate_distance;
///
/// assert!((estimate_distance(-60) - 1.0).abs() < 0.001);
/// assert!((estimate_distance(-80) - 10.0).abs() < 0.001);
/// ```
pub fn estimate_distance(rssi: i16) -> f64 {
    let power = (f64::from(rssi).abs() - RSSI_AT_ONE_METER) / (10.0 * PATH_LOSS_EXPONENT);
    10f64.powf(power)
}
