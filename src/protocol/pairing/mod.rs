//! HAP pairing protocols: Pair-Setup, Pair-Verify and pairing administration

pub mod admin;
pub mod setup;
pub mod storage;
pub mod tlv;
pub mod verify;


pub use admin::PairingEntry;
pub use setup::{AccessoryIdentity, PairSetup, SetupMethod};
pub use storage::{FileStore, MemoryStore, PairingStore, StoreError};
pub use tlv::{methods, split, TlvError, TlvReader, TlvTag, TlvWriter};
pub use verify::PairVerify;

use std::time::Duration;

use thiserror::Error;
use zeroize::Zeroize;

use super::crypto::CryptoError;

/// Per-direction transport keys produced by a completed handshake
///
/// `write_key` seals controller-to-accessory records, `read_key` opens
/// accessory-to-controller records.
#[derive(Clone)]
pub struct SessionKeys {
    /// Key for records this side sends
    pub write_key: [u8; 32],
    /// Key for records this side receives
    pub read_key: [u8; 32],
}

impl SessionKeys {
    /// The same keys viewed from the peer's side
    #[must_use]
    pub fn swapped(&self) -> Self {
        Self {
            write_key: self.read_key,
            read_key: self.write_key,
        }
    }
}

impl Drop for SessionKeys {
    fn drop(&mut self) {
        self.write_key.zeroize();
        self.read_key.zeroize();
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

/// Pairing protocol errors
///
/// The state machines never retry; every failure is terminal for the
/// attempt and propagates unchanged.
#[derive(Debug, Error)]
pub enum PairingError {
    #[error("unexpected state in {stage}: expected {expected}, got {actual}")]
    UnexpectedState {
        stage: &'static str,
        expected: u8,
        actual: u8,
    },

    #[error("malformed message in {stage}: {detail}")]
    Malformed {
        stage: &'static str,
        detail: String,
    },

    #[error("accessory reported error {code} during {stage}")]
    Accessory {
        stage: &'static str,
        code: u8,
        retry_delay: Option<Duration>,
    },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("TLV error: {0}")]
    Tlv(#[from] TlvError),

    #[error("peer {device_id} does not match the stored pairing")]
    UnknownPeer { device_id: String },

    #[error("invalid PIN: {0}")]
    InvalidPin(String),
}

/// Check a response container for an accessory error code
///
/// Any non-zero code aborts the exchange.
pub(crate) fn check_accessory_error(
    tlv: &TlvReader,
    stage: &'static str,
) -> Result<(), PairingError> {
    match tlv.error_code() {
        None | Some(0) => Ok(()),
        Some(code) => Err(PairingError::Accessory {
            stage,
            code,
            retry_delay: tlv.retry_delay().map(Duration::from_secs),
        }),
    }
}

/// Check the State field of a response container
pub(crate) fn check_state(
    tlv: &TlvReader,
    stage: &'static str,
    expected: u8,
) -> Result<(), PairingError> {
    let actual = tlv.state()?;
    if actual != expected {
        return Err(PairingError::UnexpectedState {
            stage,
            expected,
            actual,
        });
    }
    Ok(())
}
