//! Pair-Verify: ephemeral Curve25519 exchange authenticated by stored keys
//!
//! Runs at the start of every connection to an already-paired accessory
//! and yields the two per-direction transport keys.

use tracing::debug;

use super::tlv::{TlvReader, TlvTag, TlvWriter};
use super::{check_accessory_error, check_state, PairingError, SessionKeys};
use crate::protocol::crypto::{
    hkdf_labels, ChaChaCipher, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, HkdfSha512,
    Nonce, X25519KeyPair, X25519PublicKey, X25519SharedSecret,
};
use crate::types::ControllerIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VerifyState {
    Start,
    WaitingM2,
    WaitingM4,
    Complete,
    Failed,
}

/// Pair-Verify client state machine
///
/// Constructed with the accessory identity already resolved from the
/// pairing store; the ephemeral secret is fresh per attempt and never
/// reused.
pub struct PairVerify {
    state: VerifyState,
    controller_id: String,
    keypair: Ed25519KeyPair,
    accessory_id: String,
    accessory_ltpk: Ed25519PublicKey,
    ephemeral: X25519KeyPair,
    shared_secret: Option<X25519SharedSecret>,
    verify_key: Option<[u8; 32]>,
}

impl PairVerify {
    /// Create a machine for one verify attempt
    ///
    /// # Errors
    ///
    /// Returns an error for unusable key material.
    pub fn new(
        controller: &ControllerIdentity,
        accessory_id: &str,
        accessory_ltpk: &[u8],
    ) -> Result<Self, PairingError> {
        Ok(Self {
            state: VerifyState::Start,
            controller_id: controller.device_id.clone(),
            keypair: controller.signing_keypair()?,
            accessory_id: accessory_id.to_string(),
            accessory_ltpk: Ed25519PublicKey::from_bytes(accessory_ltpk)?,
            ephemeral: X25519KeyPair::generate(),
            shared_secret: None,
            verify_key: None,
        })
    }

    /// Build M1 (our ephemeral public key)
    ///
    /// # Errors
    ///
    /// Returns an error if the machine has already advanced.
    pub fn start_message(&mut self) -> Result<Vec<u8>, PairingError> {
        if self.state != VerifyState::Start {
            return Err(PairingError::Malformed {
                stage: "pair-verify M1",
                detail: "verify attempt already started".into(),
            });
        }

        debug!("pair-verify: sending M1");
        self.state = VerifyState::WaitingM2;

        Ok(TlvWriter::new()
            .add_state(1)
            .add(TlvTag::PublicKey, self.ephemeral.public_key().as_bytes())
            .build())
    }

    /// Process M2 (accessory ephemeral plus sealed signature) and build M3
    ///
    /// # Errors
    ///
    /// Fails when the sealed identifier does not match the stored pairing
    /// (`UnknownPeer`) or the accessory signature does not verify.
    pub fn handle_m2(&mut self, data: &[u8]) -> Result<Vec<u8>, PairingError> {
        const STAGE: &str = "pair-verify M2";

        self.expect(VerifyState::WaitingM2, STAGE)?;
        let tlv = TlvReader::decode(data)?;
        self.fail_on(check_accessory_error(&tlv, STAGE))?;
        self.fail_on(check_state(&tlv, STAGE, 2))?;

        let their_ephemeral_raw = tlv.get_required(TlvTag::PublicKey)?.to_vec();
        let sealed = tlv.get_required(TlvTag::EncryptedData)?;

        let their_ephemeral = X25519PublicKey::from_bytes(&their_ephemeral_raw)?;
        let shared = self.ephemeral.diffie_hellman(&their_ephemeral);

        let verify_key = HkdfSha512::new(hkdf_labels::VERIFY_ENCRYPT_SALT, shared.as_bytes())
            .expand_fixed::<32>(hkdf_labels::VERIFY_ENCRYPT_INFO)?;
        let cipher = ChaChaCipher::new(&verify_key)?;

        let opened = match cipher.open(&Nonce::from_label(b"PV-Msg02"), sealed) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.state = VerifyState::Failed;
                return Err(e.into());
            }
        };

        let sub_tlv = TlvReader::decode(&opened)?;
        let device_id_raw = sub_tlv.get_required(TlvTag::Identifier)?;
        let signature_raw = sub_tlv.get_required(TlvTag::Signature)?;

        let device_id =
            String::from_utf8(device_id_raw.to_vec()).map_err(|_| PairingError::Malformed {
                stage: STAGE,
                detail: "accessory identifier is not UTF-8".into(),
            })?;

        if device_id != self.accessory_id {
            self.state = VerifyState::Failed;
            return Err(PairingError::UnknownPeer { device_id });
        }

        // Accessory signs: its ephemeral, its device-id, our ephemeral
        let our_ephemeral = *self.ephemeral.public_key().as_bytes();
        let mut material =
            Vec::with_capacity(their_ephemeral_raw.len() + device_id_raw.len() + 32);
        material.extend_from_slice(&their_ephemeral_raw);
        material.extend_from_slice(device_id_raw);
        material.extend_from_slice(&our_ephemeral);

        let signature = Ed25519Signature::from_bytes(signature_raw)?;
        self.fail_on(
            self.accessory_ltpk
                .verify(&material, &signature)
                .map_err(PairingError::from),
        )?;

        debug!(device_id = %self.accessory_id, "pair-verify: accessory signature verified");

        // We sign the mirror image: our ephemeral, our device-id, theirs
        let mut material =
            Vec::with_capacity(32 + self.controller_id.len() + their_ephemeral_raw.len());
        material.extend_from_slice(&our_ephemeral);
        material.extend_from_slice(self.controller_id.as_bytes());
        material.extend_from_slice(&their_ephemeral_raw);

        let our_signature = self.keypair.sign(&material);

        let sub_tlv = TlvWriter::new()
            .add(TlvTag::Identifier, self.controller_id.as_bytes())
            .add(TlvTag::Signature, &our_signature.to_bytes())
            .build();

        let sealed = cipher.seal(&Nonce::from_label(b"PV-Msg03"), &sub_tlv)?;

        let m3 = TlvWriter::new()
            .add_state(3)
            .add(TlvTag::EncryptedData, &sealed)
            .build();

        self.shared_secret = Some(shared);
        self.verify_key = Some(verify_key);
        self.state = VerifyState::WaitingM4;

        Ok(m3)
    }

    /// Process M4 and finalise the per-direction transport keys
    ///
    /// # Errors
    ///
    /// A non-zero accessory error code is fatal.
    pub fn handle_m4(&mut self, data: &[u8]) -> Result<SessionKeys, PairingError> {
        const STAGE: &str = "pair-verify M4";

        self.expect(VerifyState::WaitingM4, STAGE)?;
        let tlv = TlvReader::decode(data)?;
        self.fail_on(check_accessory_error(&tlv, STAGE))?;
        self.fail_on(check_state(&tlv, STAGE, 4))?;

        let shared = self.shared_secret.take().ok_or(PairingError::Malformed {
            stage: STAGE,
            detail: "no shared secret in flight".into(),
        })?;

        let hkdf = HkdfSha512::new(hkdf_labels::CONTROL_SALT, shared.as_bytes());
        let write_key = hkdf.expand_fixed::<32>(hkdf_labels::CONTROL_WRITE_INFO)?;
        let read_key = hkdf.expand_fixed::<32>(hkdf_labels::CONTROL_READ_INFO)?;

        debug!("pair-verify: session established");
        self.state = VerifyState::Complete;

        Ok(SessionKeys {
            write_key,
            read_key,
        })
    }

    fn expect(&mut self, state: VerifyState, stage: &'static str) -> Result<(), PairingError> {
        if self.state != state {
            self.state = VerifyState::Failed;
            return Err(PairingError::Malformed {
                stage,
                detail: "machine not ready for this message".into(),
            });
        }
        Ok(())
    }

    fn fail_on<T>(&mut self, result: Result<T, PairingError>) -> Result<T, PairingError> {
        if result.is_err() {
            self.state = VerifyState::Failed;
        }
        result
    }
}
