//! Device records and identification-tool output decoding.
//!
//! The identification CLI reports plain text: the list invocation prints one
//! UDID per line, and the info invocations print `Key: Value` lines. This
//! module turns those lines into [`Device`] records and
//! [`DeviceStorageSnapshot`]s.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Info keys projected into a [`Device`].
const KEY_DEVICE_NAME: &str = "DeviceName";
const KEY_PRODUCT_TYPE: &str = "ProductType";
const KEY_PRODUCT_VERSION: &str = "ProductVersion";
const KEY_SERIAL_NUMBER: &str = "SerialNumber";

/// Storage keys vary by OS version; each field has two accepted spellings.
const KEYS_TOTAL_CAPACITY: [&str; 2] = ["TotalDiskCapacity", "TotalDataCapacity"];
const KEYS_AVAILABLE_SPACE: [&str; 2] = ["TotalDataAvailable", "AmountDataAvailable"];

/// One attached device as reported by the identification tool.
///
/// Lives only in the watcher's in-memory set; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Unique device identifier
    pub udid: String,
    /// User-visible device name
    pub name: String,
    /// Hardware model identifier (e.g., "iPhone14,2")
    pub product_type: String,
    /// OS version string
    pub product_version: String,
    /// Hardware serial number
    pub serial_number: String,
    /// False once the device has been observed missing from a poll
    pub connected: bool,
}

/// Point-in-time storage statistics for one device.
///
/// Computed on demand from the disk-usage query; never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStorageSnapshot {
    /// Total capacity in bytes
    pub total_capacity: u64,
    /// Free space in bytes
    pub available_space: u64,
    /// `total_capacity - available_space`
    pub used_space: u64,
    /// `round(used_space * ratio)`, the working size guess for a backup
    pub estimated_backup_size: u64,
}

impl DeviceStorageSnapshot {
    /// Derive a snapshot from raw capacity numbers.
    pub fn from_capacity(total_capacity: u64, available_space: u64, estimate_ratio: f64) -> Self {
        let used_space = total_capacity.saturating_sub(available_space);
        let estimated_backup_size = (used_space as f64 * estimate_ratio).round() as u64;
        Self {
            total_capacity,
            available_space,
            used_space,
            estimated_backup_size,
        }
    }
}

/// Parse `Key: Value` lines into a flat map.
///
/// Splits on the first `": "` so values containing further colons (dates,
/// MAC addresses) survive intact. Lines without a separator are skipped.
pub(crate) fn parse_key_values(output: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in output.lines() {
        if let Some((key, value)) = line.split_once(": ") {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            map.insert(key.to_string(), value.trim().to_string());
        }
    }
    map
}

/// Project known info keys into a [`Device`] record.
pub(crate) fn device_from_map(udid: &str, map: &HashMap<String, String>) -> Device {
    Device {
        udid: udid.to_string(),
        name: map
            .get(KEY_DEVICE_NAME)
            .cloned()
            .unwrap_or_else(|| "Unknown Device".to_string()),
        product_type: map.get(KEY_PRODUCT_TYPE).cloned().unwrap_or_default(),
        product_version: map.get(KEY_PRODUCT_VERSION).cloned().unwrap_or_default(),
        serial_number: map.get(KEY_SERIAL_NUMBER).cloned().unwrap_or_default(),
        connected: true,
    }
}

/// Project disk-usage keys into a storage snapshot.
///
/// Unrecognized or missing keys default to 0.
pub(crate) fn storage_from_map(
    map: &HashMap<String, String>,
    estimate_ratio: f64,
) -> DeviceStorageSnapshot {
    let total = first_u64(map, &KEYS_TOTAL_CAPACITY);
    let available = first_u64(map, &KEYS_AVAILABLE_SPACE);
    DeviceStorageSnapshot::from_capacity(total, available, estimate_ratio)
}

fn first_u64(map: &HashMap<String, String>, keys: &[&str]) -> u64 {
    keys.iter()
        .find_map(|key| map.get(*key))
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(0)
}
