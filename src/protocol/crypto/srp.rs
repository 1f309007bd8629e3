use num_bigint::BigUint;
use sha2::Sha512;
use srp::client::{SrpClient as RawClient, SrpClientVerifier};
use srp::groups::G_3072;
use zeroize::Zeroize;

use super::CryptoError;

/// Username the HAP specification fixes for the Pair-Setup PAKE
pub const SRP_USERNAME: &[u8] = b"Pair-Setup";

/// SRP-6a client (group 3072, g = 5, SHA-512)
pub struct SrpClient {
    inner: RawClient<'static, Sha512>,
    private_key: Vec<u8>,
    public_key: Vec<u8>,
}

impl Drop for SrpClient {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

impl SrpClient {
    /// Create a client with a fresh random ephemeral secret
    ///
    /// # Errors
    ///
    /// Returns an error if the system RNG fails.
    pub fn new() -> Result<Self, CryptoError> {
        use rand::RngCore;
        let mut private_key = vec![0u8; 64];
        rand::thread_rng()
            .try_fill_bytes(&mut private_key)
            .map_err(|_| CryptoError::Rng)?;

        Ok(Self::with_private_key(&private_key))
    }

    /// Create a client from a fixed ephemeral secret (test vectors)
    #[must_use]
    pub fn with_private_key(private_key: &[u8]) -> Self {
        let inner = RawClient::new(&G_3072);
        let public_key = inner.compute_public_ephemeral(private_key);
        Self {
            inner,
            private_key: private_key.to_vec(),
            public_key,
        }
    }

    /// The client public ephemeral `A`
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Process the server challenge `(salt, B)` and produce the proof state
    ///
    /// A server public key with `B ≡ 0 mod N` (RFC 5054 §2.5.3) is rejected
    /// before any proof computation: such a `B` collapses the premaster
    /// secret regardless of how it is encoded, so the reduction is done
    /// against the full group modulus rather than trusting the PAKE layer.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SrpParameter`] for a degenerate `B`.
    pub fn process_challenge(
        self,
        username: &[u8],
        password: &[u8],
        salt: &[u8],
        server_public: &[u8],
    ) -> Result<SrpSession, CryptoError> {
        let b = BigUint::from_bytes_be(server_public);
        if (b % &G_3072.n) == BigUint::default() {
            return Err(CryptoError::SrpParameter(
                "server public ephemeral is congruent to 0 mod N".into(),
            ));
        }

        let verifier = self
            .inner
            .process_reply(&self.private_key, username, password, salt, server_public)
            .map_err(|e| CryptoError::SrpParameter(e.to_string()))?;

        Ok(SrpSession { verifier })
    }

    /// Compute the password verifier `v` (server-side enrolment; used by the
    /// in-process accessory in tests)
    #[must_use]
    pub fn compute_verifier(username: &[u8], password: &[u8], salt: &[u8]) -> Vec<u8> {
        RawClient::<'static, Sha512>::new(&G_3072).compute_verifier(username, password, salt)
    }
}

/// Client state after the challenge: holds the proof `M1` and verifies `M2`
pub struct SrpSession {
    verifier: SrpClientVerifier<Sha512>,
}

impl SrpSession {
    /// The client proof `M1`
    #[must_use]
    pub fn client_proof(&self) -> &[u8] {
        self.verifier.proof()
    }

    /// Verify the server proof `M2` and release the shared key `K`
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SrpProof`] on mismatch.
    pub fn verify_server(self, server_proof: &[u8]) -> Result<SrpSharedKey, CryptoError> {
        self.verifier
            .verify_server(server_proof)
            .map_err(|_| CryptoError::SrpProof)?;

        Ok(SrpSharedKey {
            key: self.verifier.key().to_vec(),
        })
    }
}

/// The SRP shared key `K`, zeroed on drop
pub struct SrpSharedKey {
    key: Vec<u8>,
}

impl SrpSharedKey {
    /// Get the key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }
}

impl Drop for SrpSharedKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
