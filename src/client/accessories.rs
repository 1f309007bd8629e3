//! Accessory attribute database retrieval

use serde::Deserialize;

use super::{AccessoryClient, Value};
use crate::error::{HapError, Result};
use crate::net::http::Method;
use crate::net::StatusCode;

/// One accessory from the attribute database
#[derive(Debug, Clone, Deserialize)]
pub struct RawAccessory {
    /// Accessory instance id
    pub aid: u64,
    /// Services exposed by the accessory
    pub services: Vec<RawService>,
}

impl RawAccessory {
    /// Find a service by its type identifier
    #[must_use]
    pub fn service_by_type(&self, service_type: &str) -> Option<&RawService> {
        self.services
            .iter()
            .find(|s| s.service_type == service_type)
    }
}

/// One service of an accessory
#[derive(Debug, Clone, Deserialize)]
pub struct RawService {
    /// Service instance id
    pub iid: u64,
    /// Service type identifier
    #[serde(rename = "type")]
    pub service_type: String,
    /// Characteristics of the service
    pub characteristics: Vec<RawCharacteristic>,
    /// Whether this is the primary service
    #[serde(default)]
    pub primary: Option<bool>,
    /// Whether the service is hidden from users
    #[serde(default)]
    pub hidden: Option<bool>,
}

/// One characteristic as listed in the attribute database
#[derive(Debug, Clone, Deserialize)]
pub struct RawCharacteristic {
    /// Characteristic instance id
    pub iid: u64,
    /// Characteristic type identifier
    #[serde(rename = "type")]
    pub characteristic_type: String,
    /// Current value, if readable
    #[serde(default)]
    pub value: Value,
    /// Permission strings
    #[serde(default)]
    pub perms: Vec<String>,
    /// Value format
    pub format: Option<String>,
    /// Value unit
    pub unit: Option<String>,
    /// Human-readable description
    pub description: Option<String>,
}

#[derive(Deserialize)]
struct AccessoriesEnvelope {
    accessories: Vec<RawAccessory>,
}

impl AccessoryClient {
    /// Retrieve the accessory attribute database
    ///
    /// # Errors
    ///
    /// Fails on transport errors or a non-`200` status.
    pub async fn accessories(&self) -> Result<Vec<RawAccessory>> {
        let request = self.request(Method::Get, "/accessories");
        let response = self.send(&request).await?;

        if response.status != StatusCode::OK {
            return Err(HapError::status(response.status.as_u16()));
        }

        let envelope: AccessoriesEnvelope = serde_json::from_slice(&response.body)
            .map_err(|e| HapError::transport(format!("unmarshal accessories: {e}")))?;

        Ok(envelope.accessories)
    }
}
