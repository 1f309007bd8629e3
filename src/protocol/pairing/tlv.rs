//! TLV8 encoding for the HAP pairing protocols
//!
//! Values longer than 255 bytes are fragmented into consecutive triples
//! carrying the same tag; readers join them back together. A zero-length
//! separator item (`0xFF`) partitions a response into sub-containers.

use thiserror::Error;

/// TLV type codes used in HAP pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TlvTag {
    /// Pairing method
    Method = 0x00,
    /// Pairing identifier (device-id)
    Identifier = 0x01,
    /// Salt for SRP
    Salt = 0x02,
    /// Public key (SRP, Curve25519 or Ed25519 depending on message)
    PublicKey = 0x03,
    /// SRP proof (M1/M2)
    Proof = 0x04,
    /// ChaCha20-Poly1305 sealed sub-TLV
    EncryptedData = 0x05,
    /// Pairing state / sequence number
    State = 0x06,
    /// Error code
    Error = 0x07,
    /// Seconds to wait before retrying
    RetryDelay = 0x08,
    /// Certificate (software authentication)
    Certificate = 0x09,
    /// Ed25519 signature
    Signature = 0x0A,
    /// Controller permissions
    Permissions = 0x0B,
    /// Fragment data
    FragmentData = 0x0C,
    /// Fragment last
    FragmentLast = 0x0D,
    /// Zero-length list separator
    Separator = 0xFF,
}

impl TlvTag {
    /// Create from byte value
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Method),
            0x01 => Some(Self::Identifier),
            0x02 => Some(Self::Salt),
            0x03 => Some(Self::PublicKey),
            0x04 => Some(Self::Proof),
            0x05 => Some(Self::EncryptedData),
            0x06 => Some(Self::State),
            0x07 => Some(Self::Error),
            0x08 => Some(Self::RetryDelay),
            0x09 => Some(Self::Certificate),
            0x0A => Some(Self::Signature),
            0x0B => Some(Self::Permissions),
            0x0C => Some(Self::FragmentData),
            0x0D => Some(Self::FragmentLast),
            0xFF => Some(Self::Separator),
            _ => None,
        }
    }
}

/// TLV codec errors
#[derive(Debug, Error)]
pub enum TlvError {
    #[error("truncated TLV: item header cut short at offset {offset}")]
    Truncated { offset: usize },

    #[error("TLV length mismatch: {declared} byte value overruns buffer at offset {offset}")]
    LengthMismatch { declared: usize, offset: usize },

    #[error("missing required field: {0:?}")]
    MissingField(TlvTag),

    #[error("invalid value for {0:?}")]
    InvalidValue(TlvTag),
}

/// By-value TLV8 builder
pub struct TlvWriter {
    buffer: Vec<u8>,
}

impl TlvWriter {
    /// Create a new writer
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append a value, fragmenting at 255 bytes
    #[must_use]
    pub fn add(mut self, tag: TlvTag, value: &[u8]) -> Self {
        if value.is_empty() {
            self.buffer.push(tag as u8);
            self.buffer.push(0);
            return self;
        }

        for chunk in value.chunks(255) {
            self.buffer.push(tag as u8);
            #[allow(clippy::cast_possible_truncation)]
            self.buffer.push(chunk.len() as u8);
            self.buffer.extend_from_slice(chunk);
        }

        self
    }

    /// Append a single-byte value
    #[must_use]
    pub fn add_byte(self, tag: TlvTag, value: u8) -> Self {
        self.add(tag, &[value])
    }

    /// Append the pairing state
    #[must_use]
    pub fn add_state(self, state: u8) -> Self {
        self.add_byte(TlvTag::State, state)
    }

    /// Append the pairing method
    #[must_use]
    pub fn add_method(self, method: u8) -> Self {
        self.add_byte(TlvTag::Method, method)
    }

    /// Append a zero-length separator item
    #[must_use]
    pub fn add_separator(mut self) -> Self {
        self.buffer.push(TlvTag::Separator as u8);
        self.buffer.push(0);
        self
    }

    /// Finish and return the encoded bytes
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for TlvWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded TLV8 container preserving first-seen tag order
pub struct TlvReader {
    items: Vec<(u8, Vec<u8>)>,
}

impl TlvReader {
    /// Decode a single container
    ///
    /// Consecutive items with the same tag are joined; a later non-adjacent
    /// occurrence of a tag replaces the earlier value.
    ///
    /// # Errors
    ///
    /// Returns [`TlvError::Truncated`] when an item header is cut short and
    /// [`TlvError::LengthMismatch`] when a declared length overruns the buffer.
    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        let mut items: Vec<(u8, Vec<u8>)> = Vec::new();
        let mut last_tag: Option<u8> = None;
        let mut pos = 0;

        while pos < data.len() {
            if pos + 2 > data.len() {
                return Err(TlvError::Truncated { offset: pos });
            }

            let tag = data[pos];
            let length = data[pos + 1] as usize;
            pos += 2;

            if pos + length > data.len() {
                return Err(TlvError::LengthMismatch {
                    declared: length,
                    offset: pos - 1,
                });
            }

            let value = &data[pos..pos + length];
            pos += length;

            if last_tag == Some(tag) {
                // Continuation of a fragmented value
                if let Some(entry) = items.iter_mut().rev().find(|(t, _)| *t == tag) {
                    entry.1.extend_from_slice(value);
                }
            } else {
                // Boundary: a repeated tag after a different one starts over
                items.retain(|(t, _)| *t != tag);
                items.push((tag, value.to_vec()));
            }

            last_tag = Some(tag);
        }

        Ok(Self { items })
    }

    /// Get a value by tag
    #[must_use]
    pub fn get(&self, tag: TlvTag) -> Option<&[u8]> {
        self.items
            .iter()
            .find(|(t, _)| *t == tag as u8)
            .map(|(_, v)| v.as_slice())
    }

    /// Get a single-byte value by tag
    #[must_use]
    pub fn get_byte(&self, tag: TlvTag) -> Option<u8> {
        self.get(tag).and_then(|v| v.first().copied())
    }

    /// Get a required value
    ///
    /// # Errors
    ///
    /// Returns [`TlvError::MissingField`] if the tag is absent.
    pub fn get_required(&self, tag: TlvTag) -> Result<&[u8], TlvError> {
        self.get(tag).ok_or(TlvError::MissingField(tag))
    }

    /// Get the pairing state
    ///
    /// # Errors
    ///
    /// Returns an error if the state field is missing or not one byte.
    pub fn state(&self) -> Result<u8, TlvError> {
        let value = self.get_required(TlvTag::State)?;
        if value.len() != 1 {
            return Err(TlvError::InvalidValue(TlvTag::State));
        }
        Ok(value[0])
    }

    /// Get the accessory error code, if present
    #[must_use]
    pub fn error_code(&self) -> Option<u8> {
        self.get_byte(TlvTag::Error)
    }

    /// Get the advised retry delay in seconds, if present
    ///
    /// The value is a little-endian integer of 1, 2, 4 or 8 bytes.
    #[must_use]
    pub fn retry_delay(&self) -> Option<u64> {
        let raw = self.get(TlvTag::RetryDelay)?;
        if raw.is_empty() || raw.len() > 8 {
            return None;
        }
        let mut bytes = [0u8; 8];
        bytes[..raw.len()].copy_from_slice(raw);
        Some(u64::from_le_bytes(bytes))
    }

    /// Number of distinct tags present
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the container is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate values in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (u8, &[u8])> {
        self.items.iter().map(|(t, v)| (*t, v.as_slice()))
    }
}

/// Split a buffer into sub-containers delimited by separator items
///
/// A stream with *k* separators yields *k*+1 slices; separators themselves
/// are not part of any slice. Trailing separators yield a final empty slice.
///
/// # Errors
///
/// Returns the same framing errors as [`TlvReader::decode`].
pub fn split(data: &[u8]) -> Result<Vec<&[u8]>, TlvError> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut pos = 0;

    while pos < data.len() {
        let tag = data[pos];

        if tag == TlvTag::Separator as u8 {
            // Separator items carry a zero length byte
            if pos + 2 > data.len() {
                return Err(TlvError::Truncated { offset: pos });
            }
            parts.push(&data[start..pos]);
            pos += 2;
            start = pos;
            continue;
        }

        if pos + 2 > data.len() {
            return Err(TlvError::Truncated { offset: pos });
        }
        let length = data[pos + 1] as usize;
        pos += 2;
        if pos + length > data.len() {
            return Err(TlvError::LengthMismatch {
                declared: length,
                offset: pos - 1,
            });
        }
        pos += length;
    }

    parts.push(&data[start..]);
    Ok(parts)
}

/// Pairing method constants
pub mod methods {
    /// Pair-Setup
    pub const PAIR_SETUP: u8 = 0;
    /// Pair-Setup with MFi authentication
    pub const PAIR_SETUP_WITH_AUTH: u8 = 1;
    /// Pair-Verify
    pub const PAIR_VERIFY: u8 = 2;
    /// Add pairing
    pub const ADD_PAIRING: u8 = 3;
    /// Remove pairing
    pub const REMOVE_PAIRING: u8 = 4;
    /// List pairings
    pub const LIST_PAIRINGS: u8 = 5;
}
