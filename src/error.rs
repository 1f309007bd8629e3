use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::net::secure::SessionFatal;
use crate::protocol::crypto::CryptoError;
use crate::protocol::pairing::{PairingError, StoreError, TlvError};

/// Accessory-signalled error codes carried in pairing TLVs
pub mod accessory_codes {
    pub const UNKNOWN: u8 = 0x01;
    pub const AUTHENTICATION: u8 = 0x02;
    pub const BACKOFF: u8 = 0x03;
    pub const MAX_PEERS: u8 = 0x04;
    pub const MAX_TRIES: u8 = 0x05;
    pub const UNAVAILABLE: u8 = 0x06;
    pub const BUSY: u8 = 0x07;

    /// Human-readable name for an accessory error code
    #[must_use]
    pub fn name(code: u8) -> &'static str {
        match code {
            UNKNOWN => "unknown",
            AUTHENTICATION => "authentication",
            BACKOFF => "backoff",
            MAX_PEERS => "max peers",
            MAX_TRIES => "max tries",
            UNAVAILABLE => "unavailable",
            BUSY => "busy",
            _ => "unrecognized",
        }
    }
}

/// Errors surfaced by HAP controller operations
#[derive(Debug, Error)]
pub enum HapError {
    /// Underlying socket or HTTP failure, including non-success status codes
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure
        message: String,
        /// HTTP status code if the failure was a rejected response
        status: Option<u16>,
        /// The underlying source of the error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Unexpected state, method, or field in a pairing message
    #[error("protocol error during {stage}: {detail}")]
    Protocol {
        /// Protocol stage where the violation was observed
        stage: &'static str,
        /// What was malformed or unexpected
        detail: String,
    },

    /// The accessory reported an error code in a TLV response
    #[error("accessory error during {stage}: {} ({code})", accessory_codes::name(*.code))]
    Accessory {
        /// Protocol stage where the accessory reported the error
        stage: &'static str,
        /// Accessory error code (see [`accessory_codes`])
        code: u8,
        /// Advised delay before a retry, if the accessory provided one
        retry_delay: Option<Duration>,
    },

    /// AEAD open failure, signature verification failure, or SRP proof mismatch
    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    /// No pairing on record for the accessory
    #[error("no pairing on record for {device_id}")]
    UnknownPeer {
        /// Device identifier that could not be resolved
        device_id: String,
    },

    /// Fatal decryption or counter inconsistency on the encrypted transport
    #[error("secure session terminated")]
    SessionTerminated,

    /// Caller-initiated cancellation (e.g. the dialer was closed)
    #[error("operation cancelled")]
    Cancelled,

    /// Pairing store failure
    #[error("pairing store error: {0}")]
    Store(#[from] StoreError),
}

impl HapError {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    pub(crate) fn status(status: u16) -> Self {
        Self::Transport {
            message: format!("unexpected response status {status}"),
            status: Some(status),
            source: None,
        }
    }

    /// HTTP status attached to a transport error, if any
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Check whether the error indicates the connection is unusable
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Self::SessionTerminated
                | Self::Transport {
                    status: None,
                    ..
                }
        )
    }
}

impl From<io::Error> for HapError {
    fn from(err: io::Error) -> Self {
        // The secure stream reports fatal session state through a marker
        // payload so it survives the io::Error boundary.
        if err
            .get_ref()
            .is_some_and(|inner| inner.is::<SessionFatal>())
        {
            return Self::SessionTerminated;
        }

        Self::Transport {
            message: err.to_string(),
            status: None,
            source: Some(Box::new(err)),
        }
    }
}

impl From<PairingError> for HapError {
    fn from(err: PairingError) -> Self {
        match err {
            PairingError::Accessory {
                stage,
                code,
                retry_delay,
            } => Self::Accessory {
                stage,
                code,
                retry_delay,
            },
            PairingError::Crypto(e) => Self::Crypto(e),
            PairingError::UnknownPeer { device_id } => Self::UnknownPeer { device_id },
            PairingError::UnexpectedState {
                stage,
                expected,
                actual,
            } => Self::Protocol {
                stage,
                detail: format!("expected state {expected}, got {actual}"),
            },
            PairingError::Malformed { stage, detail } => Self::Protocol { stage, detail },
            PairingError::Tlv(e) => Self::Protocol {
                stage: "tlv",
                detail: e.to_string(),
            },
            PairingError::InvalidPin(detail) => Self::Protocol {
                stage: "pair-setup",
                detail,
            },
        }
    }
}

impl From<TlvError> for HapError {
    fn from(err: TlvError) -> Self {
        Self::Protocol {
            stage: "tlv",
            detail: err.to_string(),
        }
    }
}

/// Result type alias for HAP controller operations
pub type Result<T> = std::result::Result<T, HapError>;
