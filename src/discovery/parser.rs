//! TXT record parsing for HAP advertisements

use std::collections::HashMap;

use crate::types::{AccessoryDevice, FeatureFlags, StatusFlags};

/// TXT record keys accessories advertise
pub mod txt_keys {
    /// Device-id
    pub const DEVICE_ID: &str = "id";
    /// Model string
    pub const MODEL: &str = "md";
    /// Feature flags
    pub const FEATURE_FLAGS: &str = "ff";
    /// Status flags
    pub const STATUS_FLAGS: &str = "sf";
    /// Configuration number
    pub const CONFIG_NUMBER: &str = "c#";
    /// Accessory category identifier
    pub const CATEGORY: &str = "ci";
    /// Protocol version
    pub const PROTOCOL_VERSION: &str = "pv";
}

/// Parse a decimal flag byte; missing or malformed values read as zero
#[must_use]
pub fn parse_flag(value: Option<&str>) -> u8 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// Assemble a device description from resolved mDNS data
#[must_use]
pub fn device_from_txt(
    name: String,
    addresses: Vec<std::net::IpAddr>,
    port: u16,
    txt: &HashMap<String, String>,
) -> AccessoryDevice {
    let get = |key: &str| txt.get(key).map(String::as_str);

    AccessoryDevice {
        device_id: get(txt_keys::DEVICE_ID).unwrap_or(&name).to_string(),
        model: get(txt_keys::MODEL).unwrap_or_default().to_string(),
        feature_flags: FeatureFlags(parse_flag(get(txt_keys::FEATURE_FLAGS))),
        status_flags: StatusFlags(parse_flag(get(txt_keys::STATUS_FLAGS))),
        config_number: get(txt_keys::CONFIG_NUMBER).and_then(|v| v.parse().ok()),
        category: get(txt_keys::CATEGORY).and_then(|v| v.parse().ok()),
        name,
        addresses,
        port,
    }
}
