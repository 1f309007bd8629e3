use ed25519_dalek::{Signer, Verifier};

use super::{lengths, CryptoError};

/// Ed25519 signing key pair (a long-term controller or accessory identity)
pub struct Ed25519KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

impl Ed25519KeyPair {
    /// Generate a new random key pair
    #[must_use]
    pub fn generate() -> Self {
        use rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut OsRng),
        }
    }

    /// Create from stored secret key bytes
    ///
    /// Accepts either a 32-byte seed or the 64-byte expanded form
    /// (seed followed by public key) that some stores persist.
    ///
    /// # Errors
    ///
    /// Returns an error for any other length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let seed: [u8; 32] = match bytes.len() {
            lengths::ED25519_SEED | lengths::ED25519_EXPANDED => bytes[..32]
                .try_into()
                .map_err(|_| CryptoError::InvalidPublicKey)?,
            actual => {
                return Err(CryptoError::InvalidKeyLength {
                    expected: lengths::ED25519_SEED,
                    actual,
                })
            }
        };

        Ok(Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(&seed),
        })
    }

    /// Get the public half
    #[must_use]
    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// Get the seed bytes for storage
    #[must_use]
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign a message
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature {
            inner: self.signing_key.sign(message),
        }
    }
}

/// Ed25519 public key for verification
#[derive(Clone)]
pub struct Ed25519PublicKey {
    verifying_key: ed25519_dalek::VerifyingKey,
}

impl Ed25519PublicKey {
    /// Create from 32 key bytes
    ///
    /// # Errors
    ///
    /// Returns an error for a wrong length or a point not on the curve.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != lengths::ED25519_PUBLIC_KEY {
            return Err(CryptoError::InvalidKeyLength {
                expected: lengths::ED25519_PUBLIC_KEY,
                actual: bytes.len(),
            });
        }

        let bytes: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
        let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|_| CryptoError::InvalidPublicKey)?;

        Ok(Self { verifying_key })
    }

    /// Get the key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.verifying_key.as_bytes()
    }

    /// Verify a signature over a message
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SignatureVerification`] when the signature
    /// does not match.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CryptoError> {
        self.verifying_key
            .verify(message, &signature.inner)
            .map_err(|_| CryptoError::SignatureVerification)
    }
}

/// Ed25519 signature
pub struct Ed25519Signature {
    inner: ed25519_dalek::Signature,
}

impl Ed25519Signature {
    /// Create from 64 signature bytes
    ///
    /// # Errors
    ///
    /// Returns an error for any other length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != lengths::ED25519_SIGNATURE {
            return Err(CryptoError::InvalidKeyLength {
                expected: lengths::ED25519_SIGNATURE,
                actual: bytes.len(),
            });
        }

        let inner = ed25519_dalek::Signature::from_slice(bytes)
            .map_err(|_| CryptoError::InvalidSignature)?;

        Ok(Self { inner })
    }

    /// Get the signature bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }
}
