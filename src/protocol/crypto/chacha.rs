use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce as RawNonce,
};

use super::{lengths, CryptoError};

/// 12-byte nonce for ChaCha20-Poly1305
///
/// HAP uses two constructions: an 8-byte ASCII label left-padded with four
/// zero bytes for pairing sub-messages, and a little-endian record counter
/// in the same position for transport records.
#[derive(Clone, Copy)]
pub struct Nonce([u8; 12]);

impl Nonce {
    /// Create from an 8-byte message label such as `b"PS-Msg05"`
    #[must_use]
    pub fn from_label(label: &[u8; 8]) -> Self {
        let mut arr = [0u8; 12];
        arr[4..].copy_from_slice(label);
        Self(arr)
    }

    /// Create from a 64-bit record counter (little-endian, zero-padded)
    #[must_use]
    pub fn from_counter(counter: u64) -> Self {
        let mut arr = [0u8; 12];
        arr[4..].copy_from_slice(&counter.to_le_bytes());
        Self(arr)
    }

    /// Create from raw bytes
    ///
    /// # Errors
    ///
    /// Returns an error unless exactly 12 bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != lengths::CHACHA_NONCE {
            return Err(CryptoError::InvalidKeyLength {
                expected: lengths::CHACHA_NONCE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 12];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Get as bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// ChaCha20-Poly1305 AEAD cipher bound to one 32-byte key
pub struct ChaChaCipher {
    cipher: ChaCha20Poly1305,
}

impl ChaChaCipher {
    /// Create a cipher from a 32-byte key
    ///
    /// # Errors
    ///
    /// Returns an error for any other key length.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let cipher =
            ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
                expected: lengths::CHACHA_KEY,
                actual: key.len(),
            })?;

        Ok(Self { cipher })
    }

    /// Seal plaintext, returning ciphertext with the 16-byte tag appended
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::AeadSeal`] if encryption fails.
    pub fn seal(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .encrypt(RawNonce::from_slice(&nonce.0), plaintext)
            .map_err(|_| CryptoError::AeadSeal)
    }

    /// Open ciphertext-plus-tag produced by [`seal`](Self::seal)
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::AeadOpen`] on authentication failure.
    pub fn open(&self, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .decrypt(RawNonce::from_slice(&nonce.0), ciphertext)
            .map_err(|_| CryptoError::AeadOpen)
    }

    /// Seal with additional authenticated data
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::AeadSeal`] if encryption fails.
    pub fn seal_with_aad(
        &self,
        nonce: &Nonce,
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .encrypt(
                RawNonce::from_slice(&nonce.0),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::AeadSeal)
    }

    /// Open with additional authenticated data
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::AeadOpen`] on authentication failure.
    pub fn open_with_aad(
        &self,
        nonce: &Nonce,
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .decrypt(
                RawNonce::from_slice(&nonce.0),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::AeadOpen)
    }
}
