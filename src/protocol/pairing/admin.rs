//! Pairing administration messages: list, add and remove pairings
//!
//! All three exchanges run inside the encrypted session as TLV8 POSTs to
//! `/pairings`. This module builds and parses the message bodies; the
//! client layer owns the transport.

use super::tlv::{methods, split, TlvReader, TlvTag, TlvWriter};
use super::{check_accessory_error, check_state, PairingError};

/// Admin bit in a controller's permission byte
pub const PERMISSION_ADMIN: u8 = 0x01;

/// One controller pairing known to an accessory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingEntry {
    /// Controller device-id
    pub device_id: String,
    /// Controller long-term Ed25519 public key
    pub public_key: Vec<u8>,
    /// Raw permission byte
    pub permissions: u8,
}

impl PairingEntry {
    /// Whether this controller holds admin permissions
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.permissions & PERMISSION_ADMIN == PERMISSION_ADMIN
    }
}

/// Build a List-Pairings request body
#[must_use]
pub fn list_pairings_request() -> Vec<u8> {
    TlvWriter::new()
        .add_state(1)
        .add_method(methods::LIST_PAIRINGS)
        .build()
}

/// Build an Add-Pairing request body
#[must_use]
pub fn add_pairing_request(entry: &PairingEntry) -> Vec<u8> {
    TlvWriter::new()
        .add_state(1)
        .add_method(methods::ADD_PAIRING)
        .add(TlvTag::Identifier, entry.device_id.as_bytes())
        .add(TlvTag::PublicKey, &entry.public_key)
        .add_byte(TlvTag::Permissions, entry.permissions)
        .build()
}

/// Build a Remove-Pairing request body
#[must_use]
pub fn remove_pairing_request(device_id: &str) -> Vec<u8> {
    TlvWriter::new()
        .add_state(1)
        .add_method(methods::REMOVE_PAIRING)
        .add(TlvTag::Identifier, device_id.as_bytes())
        .build()
}

/// Parse the `{State=2, Error?}` response shared by add and remove
///
/// # Errors
///
/// Fails on a non-zero error code or unexpected state.
pub fn parse_status_response(data: &[u8], stage: &'static str) -> Result<(), PairingError> {
    let tlv = TlvReader::decode(data)?;
    check_accessory_error(&tlv, stage)?;
    check_state(&tlv, stage, 2)?;
    Ok(())
}

/// Parse a List-Pairings response
///
/// The body is a separator-partitioned stream; the first sub-container
/// carries the status fields alongside (or instead of) the first entry.
/// An empty pairing list parses to zero entries.
///
/// # Errors
///
/// Fails on a non-zero error code, unexpected state, or malformed entry.
pub fn parse_list_response(data: &[u8]) -> Result<Vec<PairingEntry>, PairingError> {
    const STAGE: &str = "list-pairings";

    let parts = split(data)?;
    let mut entries = Vec::with_capacity(parts.len());

    for (index, part) in parts.iter().enumerate() {
        let tlv = TlvReader::decode(part)?;

        if index == 0 {
            check_accessory_error(&tlv, STAGE)?;
            check_state(&tlv, STAGE, 2)?;
        }

        let Some(device_id_raw) = tlv.get(TlvTag::Identifier) else {
            // Status-only container (empty pairing list)
            continue;
        };

        let device_id =
            String::from_utf8(device_id_raw.to_vec()).map_err(|_| PairingError::Malformed {
                stage: STAGE,
                detail: "controller identifier is not UTF-8".into(),
            })?;

        let public_key = tlv.get_required(TlvTag::PublicKey)?.to_vec();
        let permissions = tlv.get_byte(TlvTag::Permissions).unwrap_or(0);

        entries.push(PairingEntry {
            device_id,
            public_key,
            permissions,
        });
    }

    Ok(entries)
}
