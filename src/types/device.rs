//! Discovered accessory descriptions

use std::fmt;
use std::net::IpAddr;

/// Bonjour TXT status flags (`sf`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags(pub u8);

impl StatusFlags {
    /// Bit 0: accessory has never been paired
    #[must_use]
    pub fn is_unpaired(self) -> bool {
        self.0 & 0x01 != 0
    }

    /// Bit 1: accessory has not joined a Wi-Fi network
    #[must_use]
    pub fn wifi_not_configured(self) -> bool {
        self.0 & 0x02 != 0
    }

    /// Bit 2: accessory reports a problem
    #[must_use]
    pub fn has_problem(self) -> bool {
        self.0 & 0x04 != 0
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut notes = vec![if self.is_unpaired() {
            "is not paired"
        } else {
            "is paired"
        }];
        if self.wifi_not_configured() {
            notes.push("is not configured for wifi");
        }
        if self.has_problem() {
            notes.push("has a problem");
        }
        write!(f, "accessory {}", notes.join("/"))
    }
}

/// Bonjour TXT feature flags (`ff`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags(pub u8);

impl FeatureFlags {
    /// Bit 0: supports hardware (MFi) authentication
    #[must_use]
    pub fn supports_hardware_auth(self) -> bool {
        self.0 & 0x01 != 0
    }

    /// Bit 1: supports software authentication
    #[must_use]
    pub fn supports_software_auth(self) -> bool {
        self.0 & 0x02 != 0
    }
}

impl fmt::Display for FeatureFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.supports_hardware_auth(), self.supports_software_auth()) {
            (true, true) => write!(f, "supports hardware and software authentication"),
            (true, false) => write!(f, "supports hardware authentication"),
            (false, true) => write!(f, "supports software authentication"),
            (false, false) => write!(f, "uncertified"),
        }
    }
}

/// A HomeKit accessory found on the local network
#[derive(Debug, Clone)]
pub struct AccessoryDevice {
    /// Bonjour instance name
    pub name: String,
    /// Device-id (TXT `id`)
    pub device_id: String,
    /// Model string (TXT `md`)
    pub model: String,
    /// Resolved addresses
    pub addresses: Vec<IpAddr>,
    /// HAP port
    pub port: u16,
    /// Feature flags (TXT `ff`)
    pub feature_flags: FeatureFlags,
    /// Status flags (TXT `sf`)
    pub status_flags: StatusFlags,
    /// Current configuration number (TXT `c#`), if advertised
    pub config_number: Option<u32>,
    /// Accessory category (TXT `ci`), if advertised
    pub category: Option<u16>,
}

impl AccessoryDevice {
    /// Pick the first usable address, preferring IPv4
    #[must_use]
    pub fn primary_address(&self) -> Option<IpAddr> {
        self.addresses
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| self.addresses.first())
            .copied()
    }
}
