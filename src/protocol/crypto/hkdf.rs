use hkdf::Hkdf;
use sha2::Sha512;

use super::CryptoError;

/// HKDF-SHA-512 extract-then-expand
pub struct HkdfSha512 {
    hkdf: Hkdf<Sha512>,
}

impl HkdfSha512 {
    /// Create from input key material and a salt
    #[must_use]
    pub fn new(salt: &[u8], ikm: &[u8]) -> Self {
        Self {
            hkdf: Hkdf::<Sha512>::new(Some(salt), ikm),
        }
    }

    /// Expand into a fixed-size output
    ///
    /// # Errors
    ///
    /// Returns an error if the requested length is invalid for HKDF.
    pub fn expand_fixed<const N: usize>(&self, info: &[u8]) -> Result<[u8; N], CryptoError> {
        let mut okm = [0u8; N];
        self.hkdf
            .expand(info, &mut okm)
            .map_err(|_| CryptoError::KeyDerivation(format!("expand to {N} bytes failed")))?;
        Ok(okm)
    }

    /// Expand into a variable-length output
    ///
    /// # Errors
    ///
    /// Returns an error if the requested length is invalid for HKDF.
    pub fn expand(&self, info: &[u8], length: usize) -> Result<Vec<u8>, CryptoError> {
        let mut okm = vec![0u8; length];
        self.hkdf
            .expand(info, &mut okm)
            .map_err(|_| CryptoError::KeyDerivation(format!("expand to {length} bytes failed")))?;
        Ok(okm)
    }
}

/// One-shot 32-byte derivation, the shape every HAP stage uses
///
/// # Errors
///
/// Returns an error if expansion fails.
pub fn derive_key32(salt: &[u8], ikm: &[u8], info: &[u8]) -> Result<[u8; 32], CryptoError> {
    HkdfSha512::new(salt, ikm).expand_fixed::<32>(info)
}
