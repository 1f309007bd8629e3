//! Characteristic read and write calls

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AccessoryClient, Value};
use crate::error::{HapError, Result};
use crate::net::http::Method;
use crate::net::StatusCode;

/// A characteristic addressed as `aid.iid`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicId {
    /// Accessory instance id
    pub aid: u64,
    /// Characteristic instance id
    pub iid: u64,
}

/// A batch read with optional extra fields
#[derive(Debug, Clone, Default)]
pub struct CharacteristicsReadRequest {
    /// Characteristics to read
    pub ids: Vec<CharacteristicId>,
    /// Include metadata (format, unit, range)
    pub metadata: bool,
    /// Include permissions
    pub permissions: bool,
    /// Include the characteristic type
    pub types: bool,
    /// Include event subscription status
    pub events: bool,
}

/// One entry of a read response
///
/// Optional fields depend on the request options and the accessory.
#[derive(Debug, Clone, Deserialize)]
pub struct CharacteristicReadResponse {
    /// Accessory instance id
    pub aid: u64,
    /// Characteristic instance id
    pub iid: u64,
    /// Raw value; decode once the format is known
    #[serde(default)]
    pub value: Value,

    /// Characteristic type, with `type=1`
    #[serde(rename = "type")]
    pub characteristic_type: Option<String>,
    /// Per-entry HAP status, set in `207` responses
    pub status: Option<i32>,
    /// Event subscription state, with `ev=1`
    pub ev: Option<bool>,
    /// Permission strings, with `perms=1`
    pub perms: Option<Vec<String>>,

    /// Value format, with `meta=1`
    pub format: Option<String>,
    /// Value unit, with `meta=1`
    pub unit: Option<String>,
    /// Maximum string length
    #[serde(rename = "maxLen")]
    pub max_len: Option<i64>,
    /// Maximum value
    #[serde(rename = "maxValue", default)]
    pub max_value: Value,
    /// Minimum value
    #[serde(rename = "minValue", default)]
    pub min_value: Value,
    /// Step between values
    #[serde(rename = "minStep", default)]
    pub min_step: Value,
}

/// A single characteristic write
#[derive(Debug, Clone, Serialize)]
pub struct CharacteristicWrite {
    /// Accessory instance id
    pub aid: u64,
    /// Characteristic instance id
    pub iid: u64,
    /// Value to write, absent for event-only updates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Subscribe (or unsubscribe) to events
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ev: bool,
    /// Authorization data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authdata: Option<String>,
    /// Write originates from a remote controller
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub remote: bool,
    /// Request a write response
    #[serde(rename = "r", skip_serializing_if = "std::ops::Not::not")]
    pub response: bool,
}

impl CharacteristicWrite {
    /// A plain value write
    #[must_use]
    pub fn value(id: CharacteristicId, value: serde_json::Value) -> Self {
        Self {
            aid: id.aid,
            iid: id.iid,
            value: Some(value),
            ev: false,
            authdata: None,
            remote: false,
            response: false,
        }
    }
}

/// A batch write
#[derive(Debug, Clone, Serialize)]
pub struct CharacteristicsWriteRequest {
    /// Writes to apply
    pub characteristics: Vec<CharacteristicWrite>,
    /// Prepare-id from a preceding timed-write prepare
    #[serde(rename = "pid", skip_serializing_if = "Option::is_none")]
    pub prepare_id: Option<u64>,
}

/// One entry of a write response
#[derive(Debug, Clone, Deserialize)]
pub struct CharacteristicWriteResponse {
    /// Accessory instance id
    pub aid: u64,
    /// Characteristic instance id
    pub iid: u64,
    /// Per-entry HAP status; absent when synthesised from a `204`
    pub status: Option<i32>,
    /// Returned value, when a write response was requested
    #[serde(default)]
    pub value: Value,
}

#[derive(Deserialize)]
struct CharacteristicsEnvelope<T> {
    characteristics: Vec<T>,
}

impl AccessoryClient {
    /// Read characteristic values
    ///
    /// Both `200` and `207 Multi-Status` bodies are returned entry-for-entry
    /// unchanged; per-entry failures appear in each entry's `status`.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or any other response status.
    pub async fn characteristics(
        &self,
        read: &CharacteristicsReadRequest,
    ) -> Result<Vec<CharacteristicReadResponse>> {
        // Accessories reject percent-encoded commas in the id list, so the
        // query is assembled by hand with raw separators.
        let ids = read
            .ids
            .iter()
            .map(|id| format!("{}.{}", id.aid, id.iid))
            .collect::<Vec<_>>()
            .join(",");

        let mut path = format!("/characteristics?id={ids}");
        if read.metadata {
            path.push_str("&meta=1");
        }
        if read.permissions {
            path.push_str("&perms=1");
        }
        if read.types {
            path.push_str("&type=1");
        }
        if read.events {
            path.push_str("&ev=1");
        }

        let request = self.request(Method::Get, path);
        let response = self.send(&request).await?;

        if response.status != StatusCode::OK && response.status != StatusCode::MULTI_STATUS {
            return Err(HapError::status(response.status.as_u16()));
        }

        debug!(
            status = response.status.as_u16(),
            entries = read.ids.len(),
            "characteristics read"
        );

        let envelope: CharacteristicsEnvelope<CharacteristicReadResponse> =
            serde_json::from_slice(&response.body).map_err(|e| {
                HapError::transport(format!("unmarshal characteristics response: {e}"))
            })?;

        Ok(envelope.characteristics)
    }

    /// Write characteristic values and settings
    ///
    /// A `204 No Content` response synthesises one stub entry per write; a
    /// `200` or `207` body is returned as sent by the accessory.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or any other response status.
    pub async fn set_characteristics(
        &self,
        write: &CharacteristicsWriteRequest,
    ) -> Result<Vec<CharacteristicWriteResponse>> {
        let body = serde_json::to_vec(write)
            .map_err(|e| HapError::transport(format!("marshal write request: {e}")))?;

        let request = self
            .request(Method::Put, "/characteristics")
            .body(crate::net::http::content_types::HAP_JSON, body);

        let response = self.send(&request).await?;

        match response.status {
            StatusCode::NO_CONTENT => Ok(write
                .characteristics
                .iter()
                .map(|w| CharacteristicWriteResponse {
                    aid: w.aid,
                    iid: w.iid,
                    status: None,
                    value: Value::default(),
                })
                .collect()),
            StatusCode::OK | StatusCode::MULTI_STATUS => {
                let envelope: CharacteristicsEnvelope<CharacteristicWriteResponse> =
                    serde_json::from_slice(&response.body).map_err(|e| {
                        HapError::transport(format!("unmarshal write response: {e}"))
                    })?;
                Ok(envelope.characteristics)
            }
            status => Err(HapError::status(status.as_u16())),
        }
    }
}
