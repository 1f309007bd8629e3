//! Controller and accessory identity records

use serde::{Deserialize, Serialize};

use crate::protocol::crypto::{CryptoError, Ed25519KeyPair};

/// Serde helper: key material as base64 strings in JSON
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// The controller's long-term identity
///
/// The device-id is an opaque UTF-8 label that stays stable across
/// sessions; accessories key their pairing records by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerIdentity {
    /// Stable device identifier
    #[serde(rename = "DeviceID")]
    pub device_id: String,
    /// Long-term Ed25519 public key
    #[serde(rename = "PublicKey", with = "base64_bytes")]
    pub public_key: Vec<u8>,
    /// Long-term Ed25519 secret key (32-byte seed or 64-byte expanded form)
    #[serde(rename = "PrivateKey", with = "base64_bytes")]
    pub private_key: Vec<u8>,
}

impl ControllerIdentity {
    /// Generate a fresh identity with a random MAC-style device-id
    #[must_use]
    pub fn generate() -> Self {
        use rand::RngCore;

        let mut id_bytes = [0u8; 6];
        rand::thread_rng().fill_bytes(&mut id_bytes);
        let device_id = id_bytes
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":");

        let keypair = Ed25519KeyPair::generate();

        Self {
            device_id,
            public_key: keypair.public_key().as_bytes().to_vec(),
            private_key: keypair.secret_bytes().to_vec(),
        }
    }

    /// Reconstruct the signing key pair from the stored secret
    ///
    /// # Errors
    ///
    /// Returns an error for unusable key material.
    pub fn signing_keypair(&self) -> Result<Ed25519KeyPair, CryptoError> {
        Ed25519KeyPair::from_bytes(&self.private_key)
    }
}

/// Network location of an accessory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpConnectionInfo {
    /// IP address, literal v4 or v6
    #[serde(rename = "IPAddress")]
    pub ip_address: String,
    /// TCP port
    #[serde(rename = "Port")]
    pub port: u16,
}

impl IpConnectionInfo {
    /// Format as a dialable `host:port` string
    #[must_use]
    pub fn to_addr_string(&self) -> String {
        if self.ip_address.contains(':') {
            format!("[{}]:{}", self.ip_address, self.port)
        } else {
            format!("{}:{}", self.ip_address, self.port)
        }
    }
}

/// A stored pairing with an accessory: its identity plus where to reach it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessoryPairing {
    /// Display name; defaults to the device-id
    #[serde(rename = "Name")]
    pub name: String,
    /// Accessory device-id (the pairing store key)
    #[serde(rename = "DeviceID")]
    pub device_id: String,
    /// Accessory long-term Ed25519 public key
    #[serde(rename = "PublicKey", with = "base64_bytes")]
    pub public_key: Vec<u8>,
    /// Last known network location
    #[serde(flatten)]
    pub connection: IpConnectionInfo,
}

/// Everything needed to run Pair-Setup against an unpaired accessory
#[derive(Debug, Clone)]
pub struct AccessoryPairingConfig {
    /// Accessory device-id (from discovery)
    pub device_id: String,
    /// Setup PIN, with or without dashes
    pub pin: String,
    /// Network location
    pub connection: IpConnectionInfo,
}
