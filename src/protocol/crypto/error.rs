use thiserror::Error;

/// Cryptographic operation errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature encoding")]
    InvalidSignature,

    #[error("signature verification failed")]
    SignatureVerification,

    #[error("AEAD open failed")]
    AeadOpen,

    #[error("AEAD seal failed")]
    AeadSeal,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("SRP parameter rejected: {0}")]
    SrpParameter(String),

    #[error("SRP proof mismatch")]
    SrpProof,

    #[error("RNG failure")]
    Rng,
}
