use x25519_dalek::{PublicKey, StaticSecret};

use super::{lengths, CryptoError};

/// X25519 key pair for ephemeral Diffie-Hellman during Pair-Verify
pub struct X25519KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl X25519KeyPair {
    /// Generate a new random key pair
    #[must_use]
    pub fn generate() -> Self {
        use rand::rngs::OsRng;
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the public half
    #[must_use]
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey { inner: self.public }
    }

    /// Perform the key agreement
    #[must_use]
    pub fn diffie_hellman(&self, their_public: &X25519PublicKey) -> X25519SharedSecret {
        let shared = self.secret.diffie_hellman(&their_public.inner);
        X25519SharedSecret {
            bytes: shared.to_bytes(),
        }
    }
}

/// X25519 public key
#[derive(Clone, Copy)]
pub struct X25519PublicKey {
    inner: PublicKey,
}

impl X25519PublicKey {
    /// Create from 32 key bytes
    ///
    /// # Errors
    ///
    /// Returns an error for any other length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != lengths::X25519_KEY {
            return Err(CryptoError::InvalidKeyLength {
                expected: lengths::X25519_KEY,
                actual: bytes.len(),
            });
        }

        let bytes: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self {
            inner: PublicKey::from(bytes),
        })
    }

    /// Get the key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.inner.as_bytes()
    }
}

/// Shared secret produced by the key agreement, zeroed on drop
pub struct X25519SharedSecret {
    bytes: [u8; 32],
}

impl X25519SharedSecret {
    /// Get the secret bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl Drop for X25519SharedSecret {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.bytes.zeroize();
    }
}
