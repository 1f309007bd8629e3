//! Cryptographic primitives backing the HAP pairing and transport layers
//!
//! Thin newtype wrappers so the protocol code never handles third-party
//! crypto types directly.

mod chacha;
mod ed25519;
mod error;
mod hkdf;
mod srp;
mod x25519;


pub use self::chacha::{ChaChaCipher, Nonce};
pub use self::ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
pub use self::error::CryptoError;
pub use self::hkdf::HkdfSha512;
pub use self::srp::{SrpClient, SrpSession, SrpSharedKey, SRP_USERNAME};
pub use self::x25519::{X25519KeyPair, X25519PublicKey, X25519SharedSecret};

/// HKDF-SHA-512 salt and info labels fixed by the HAP specification
pub mod hkdf_labels {
    /// Pair-Setup M5/M6 AEAD key
    pub const SETUP_ENCRYPT_SALT: &[u8] = b"Pair-Setup-Encrypt-Salt";
    pub const SETUP_ENCRYPT_INFO: &[u8] = b"Pair-Setup-Encrypt-Info";
    /// Material prefix signed by the controller in M5
    pub const SETUP_CONTROLLER_SIGN_SALT: &[u8] = b"Pair-Setup-Controller-Sign-Salt";
    pub const SETUP_CONTROLLER_SIGN_INFO: &[u8] = b"Pair-Setup-Controller-Sign-Info";
    /// Material prefix verified against the accessory LTPK in M6
    pub const SETUP_ACCESSORY_SIGN_SALT: &[u8] = b"Pair-Setup-Accessory-Sign-Salt";
    pub const SETUP_ACCESSORY_SIGN_INFO: &[u8] = b"Pair-Setup-Accessory-Sign-Info";
    /// Pair-Verify sub-message AEAD key
    pub const VERIFY_ENCRYPT_SALT: &[u8] = b"Pair-Verify-Encrypt-Salt";
    pub const VERIFY_ENCRYPT_INFO: &[u8] = b"Pair-Verify-Encrypt-Info";
    /// Transport record keys, one per direction
    pub const CONTROL_SALT: &[u8] = b"Control-Salt";
    pub const CONTROL_WRITE_INFO: &[u8] = b"Control-Write-Encryption-Key";
    pub const CONTROL_READ_INFO: &[u8] = b"Control-Read-Encryption-Key";
}

/// Lengths of the fixed-size cryptographic values
pub mod lengths {
    /// Ed25519 public key length
    pub const ED25519_PUBLIC_KEY: usize = 32;
    /// Ed25519 seed length
    pub const ED25519_SEED: usize = 32;
    /// Ed25519 expanded private key length (seed followed by public key)
    pub const ED25519_EXPANDED: usize = 64;
    /// Ed25519 signature length
    pub const ED25519_SIGNATURE: usize = 64;
    /// X25519 key length
    pub const X25519_KEY: usize = 32;
    /// ChaCha20-Poly1305 key length
    pub const CHACHA_KEY: usize = 32;
    /// ChaCha20-Poly1305 nonce length
    pub const CHACHA_NONCE: usize = 12;
    /// ChaCha20-Poly1305 tag length
    pub const CHACHA_TAG: usize = 16;
}
