//! Deferred-decode characteristic values
//!
//! Characteristic values are schema-dependent; the wire carries a bare JSON
//! fragment whose type is only known once metadata (or a type registry) has
//! been consulted. [`Value`] keeps the raw fragment and re-encodes it
//! byte-identically when the value was never decoded.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use thiserror::Error;

/// Failed typed access to a raw value
#[derive(Debug, Error)]
pub enum ValueError {
    #[error("no value present")]
    Missing,

    #[error("value {raw} cannot be read as {expected}")]
    WrongType {
        /// What the caller asked for
        expected: &'static str,
        /// The raw JSON fragment
        raw: String,
    },
}

/// A raw JSON characteristic value
///
/// Typed accessors decode on demand and surface a [`ValueError`] rather
/// than panicking on schema mismatches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Value {
    raw: Option<Box<RawValue>>,
}

impl Value {
    /// Build a value from any serialisable type
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be serialised to JSON.
    pub fn from_typed<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let raw = serde_json::value::to_raw_value(value)?;
        Ok(Self { raw: Some(raw) })
    }

    /// Whether a value is present (JSON `null` counts as absent)
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.raw.as_deref().is_some_and(|r| r.get() != "null")
    }

    /// The raw JSON fragment, if any
    #[must_use]
    pub fn raw_json(&self) -> Option<&str> {
        self.raw.as_deref().map(RawValue::get)
    }

    fn decode<T: for<'de> Deserialize<'de>>(
        &self,
        expected: &'static str,
    ) -> Result<T, ValueError> {
        let raw = self.raw.as_deref().ok_or(ValueError::Missing)?;
        serde_json::from_str(raw.get()).map_err(|_| ValueError::WrongType {
            expected,
            raw: raw.get().to_string(),
        })
    }

    /// Read as bool
    ///
    /// # Errors
    ///
    /// Returns an error when absent or not a boolean.
    pub fn as_bool(&self) -> Result<bool, ValueError> {
        self.decode("bool")
    }

    /// Read as u8
    ///
    /// # Errors
    ///
    /// Returns an error when absent or out of range.
    pub fn as_u8(&self) -> Result<u8, ValueError> {
        self.decode("u8")
    }

    /// Read as u16
    ///
    /// # Errors
    ///
    /// Returns an error when absent or out of range.
    pub fn as_u16(&self) -> Result<u16, ValueError> {
        self.decode("u16")
    }

    /// Read as u32
    ///
    /// # Errors
    ///
    /// Returns an error when absent or out of range.
    pub fn as_u32(&self) -> Result<u32, ValueError> {
        self.decode("u32")
    }

    /// Read as u64
    ///
    /// # Errors
    ///
    /// Returns an error when absent or out of range.
    pub fn as_u64(&self) -> Result<u64, ValueError> {
        self.decode("u64")
    }

    /// Read as i32
    ///
    /// # Errors
    ///
    /// Returns an error when absent or out of range.
    pub fn as_i32(&self) -> Result<i32, ValueError> {
        self.decode("i32")
    }

    /// Read as f64
    ///
    /// # Errors
    ///
    /// Returns an error when absent or not numeric.
    pub fn as_f64(&self) -> Result<f64, ValueError> {
        self.decode("f64")
    }

    /// Read as a string
    ///
    /// # Errors
    ///
    /// Returns an error when absent or not a JSON string.
    pub fn as_string(&self) -> Result<String, ValueError> {
        self.decode("string")
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw_json() == other.raw_json()
    }
}
