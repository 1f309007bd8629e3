//! Pair-Setup: PIN-authenticated SRP exchange producing long-term keys
//!
//! Runs once per controller/accessory pair, over unencrypted HTTP. Six
//! messages flow as three request/response rounds; on success each side
//! holds the other's long-term Ed25519 public key.

use tracing::debug;

use super::tlv::{methods, TlvReader, TlvTag, TlvWriter};
use super::{check_accessory_error, check_state, PairingError};
use crate::protocol::crypto::{
    hkdf_labels, ChaChaCipher, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, HkdfSha512,
    Nonce, SrpClient, SrpSession, SrpSharedKey, SRP_USERNAME,
};
use crate::types::ControllerIdentity;

/// Pair-Setup method selector for M1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetupMethod {
    /// Plain SRP pairing
    #[default]
    PairSetup,
    /// Pairing with an MFi/software authentication step; the extra
    /// certificate TLVs an accessory may return are accepted and ignored
    PairSetupWithAuth,
}

impl SetupMethod {
    fn byte(self) -> u8 {
        match self {
            Self::PairSetup => methods::PAIR_SETUP,
            Self::PairSetupWithAuth => methods::PAIR_SETUP_WITH_AUTH,
        }
    }
}

/// Accessory identity learned from a successful Pair-Setup
#[derive(Debug, Clone)]
pub struct AccessoryIdentity {
    /// Accessory device-id (the pairing store key)
    pub device_id: String,
    /// Accessory long-term Ed25519 public key
    pub public_key: [u8; 32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetupState {
    Start,
    WaitingM2,
    WaitingM4,
    WaitingM6,
    Complete,
    Failed,
}

/// Pair-Setup client state machine
///
/// Advances strictly M1 → M2 → M3 → M4 → M5 → M6; any failure is terminal
/// for the attempt. Holds no retry policy.
pub struct PairSetup {
    state: SetupState,
    method: SetupMethod,
    pin: String,
    controller_id: String,
    keypair: Ed25519KeyPair,
    srp_session: Option<SrpSession>,
    shared_key: Option<SrpSharedKey>,
}

impl PairSetup {
    /// Create a machine for one setup attempt
    ///
    /// # Errors
    ///
    /// Returns an error for an unusable PIN or controller key material.
    pub fn new(
        controller: &ControllerIdentity,
        pin: &str,
        method: SetupMethod,
    ) -> Result<Self, PairingError> {
        Ok(Self {
            state: SetupState::Start,
            method,
            pin: normalize_pin(pin)?,
            controller_id: controller.device_id.clone(),
            keypair: controller.signing_keypair()?,
            srp_session: None,
            shared_key: None,
        })
    }

    /// Build M1
    ///
    /// # Errors
    ///
    /// Returns an error if the machine has already advanced.
    pub fn start_message(&mut self) -> Result<Vec<u8>, PairingError> {
        if self.state != SetupState::Start {
            return Err(PairingError::Malformed {
                stage: "pair-setup M1",
                detail: "setup attempt already started".into(),
            });
        }

        debug!(method = self.method.byte(), "pair-setup: sending M1");
        self.state = SetupState::WaitingM2;

        Ok(TlvWriter::new()
            .add_state(1)
            .add_method(self.method.byte())
            .build())
    }

    /// Process M2 (salt and SRP server ephemeral) and build M3
    ///
    /// # Errors
    ///
    /// Fails on an accessory error code (including *unavailable* and *busy*
    /// with their advised retry delay), an unexpected state, or a
    /// degenerate server public key.
    pub fn handle_m2(&mut self, data: &[u8]) -> Result<Vec<u8>, PairingError> {
        const STAGE: &str = "pair-setup M2";

        self.expect(SetupState::WaitingM2, STAGE, 2)?;
        let tlv = TlvReader::decode(data)?;
        self.fail_on(check_accessory_error(&tlv, STAGE))?;
        self.fail_on(check_state(&tlv, STAGE, 2))?;

        let salt = tlv.get_required(TlvTag::Salt)?;
        let server_public = tlv.get_required(TlvTag::PublicKey)?;

        let srp = SrpClient::new()?;
        let client_public = srp.public_key().to_vec();

        debug!(
            salt_len = salt.len(),
            server_public_len = server_public.len(),
            "pair-setup: processing SRP challenge"
        );

        let session = self.fail_on(
            srp.process_challenge(SRP_USERNAME, self.pin.as_bytes(), salt, server_public)
                .map_err(PairingError::from),
        )?;

        let m3 = TlvWriter::new()
            .add_state(3)
            .add(TlvTag::PublicKey, &client_public)
            .add(TlvTag::Proof, session.client_proof())
            .build();

        self.srp_session = Some(session);
        self.state = SetupState::WaitingM4;

        Ok(m3)
    }

    /// Process M4 (server proof) and build M5 (sealed controller identity)
    ///
    /// # Errors
    ///
    /// A server proof mismatch surfaces as an SRP proof failure; nothing is
    /// written to any store on that path.
    pub fn handle_m4(&mut self, data: &[u8]) -> Result<Vec<u8>, PairingError> {
        const STAGE: &str = "pair-setup M4";

        self.expect(SetupState::WaitingM4, STAGE, 4)?;
        let tlv = TlvReader::decode(data)?;
        self.fail_on(check_accessory_error(&tlv, STAGE))?;
        self.fail_on(check_state(&tlv, STAGE, 4))?;

        let server_proof = tlv.get_required(TlvTag::Proof)?;

        let session = self.srp_session.take().ok_or(PairingError::Malformed {
            stage: STAGE,
            detail: "no SRP session in flight".into(),
        })?;

        let shared = self.fail_on(
            session
                .verify_server(server_proof)
                .map_err(PairingError::from),
        )?;

        debug!("pair-setup: SRP proof verified, sealing controller identity");

        // Sealed sub-TLV: who we are, our LTPK, and a signature binding both
        // to this SRP session.
        let prefix = HkdfSha512::new(hkdf_labels::SETUP_CONTROLLER_SIGN_SALT, shared.as_bytes())
            .expand_fixed::<32>(hkdf_labels::SETUP_CONTROLLER_SIGN_INFO)?;

        let ltpk = self.keypair.public_key();
        let mut material =
            Vec::with_capacity(prefix.len() + self.controller_id.len() + ltpk.as_bytes().len());
        material.extend_from_slice(&prefix);
        material.extend_from_slice(self.controller_id.as_bytes());
        material.extend_from_slice(ltpk.as_bytes());

        let signature = self.keypair.sign(&material);

        let sub_tlv = TlvWriter::new()
            .add(TlvTag::Identifier, self.controller_id.as_bytes())
            .add(TlvTag::PublicKey, ltpk.as_bytes())
            .add(TlvTag::Signature, &signature.to_bytes())
            .build();

        let encrypt_key = HkdfSha512::new(hkdf_labels::SETUP_ENCRYPT_SALT, shared.as_bytes())
            .expand_fixed::<32>(hkdf_labels::SETUP_ENCRYPT_INFO)?;
        let cipher = ChaChaCipher::new(&encrypt_key)?;
        let sealed = cipher.seal(&Nonce::from_label(b"PS-Msg05"), &sub_tlv)?;

        let m5 = TlvWriter::new()
            .add_state(5)
            .add(TlvTag::EncryptedData, &sealed)
            .build();

        self.shared_key = Some(shared);
        self.state = SetupState::WaitingM6;

        Ok(m5)
    }

    /// Process M6 (sealed accessory identity) and complete the exchange
    ///
    /// # Errors
    ///
    /// Fails on decryption failure or an accessory signature that does not
    /// bind the returned identity to this SRP session.
    pub fn handle_m6(&mut self, data: &[u8]) -> Result<AccessoryIdentity, PairingError> {
        const STAGE: &str = "pair-setup M6";

        self.expect(SetupState::WaitingM6, STAGE, 6)?;
        let tlv = TlvReader::decode(data)?;
        self.fail_on(check_accessory_error(&tlv, STAGE))?;
        self.fail_on(check_state(&tlv, STAGE, 6))?;

        let sealed = tlv.get_required(TlvTag::EncryptedData)?;

        let shared = self.shared_key.as_ref().ok_or(PairingError::Malformed {
            stage: STAGE,
            detail: "no SRP shared key in flight".into(),
        })?;

        let encrypt_key = HkdfSha512::new(hkdf_labels::SETUP_ENCRYPT_SALT, shared.as_bytes())
            .expand_fixed::<32>(hkdf_labels::SETUP_ENCRYPT_INFO)?;
        let cipher = ChaChaCipher::new(&encrypt_key)?;

        let opened = match cipher.open(&Nonce::from_label(b"PS-Msg06"), sealed) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.state = SetupState::Failed;
                return Err(e.into());
            }
        };

        let sub_tlv = TlvReader::decode(&opened)?;
        let device_id_raw = sub_tlv.get_required(TlvTag::Identifier)?;
        let ltpk_raw = sub_tlv.get_required(TlvTag::PublicKey)?;
        let signature_raw = sub_tlv.get_required(TlvTag::Signature)?;

        let device_id =
            String::from_utf8(device_id_raw.to_vec()).map_err(|_| PairingError::Malformed {
                stage: STAGE,
                detail: "accessory identifier is not UTF-8".into(),
            })?;

        let prefix = HkdfSha512::new(hkdf_labels::SETUP_ACCESSORY_SIGN_SALT, shared.as_bytes())
            .expand_fixed::<32>(hkdf_labels::SETUP_ACCESSORY_SIGN_INFO)?;

        let mut material = Vec::with_capacity(prefix.len() + device_id_raw.len() + ltpk_raw.len());
        material.extend_from_slice(&prefix);
        material.extend_from_slice(device_id_raw);
        material.extend_from_slice(ltpk_raw);

        let ltpk = Ed25519PublicKey::from_bytes(ltpk_raw)?;
        let signature = Ed25519Signature::from_bytes(signature_raw)?;
        self.fail_on(
            ltpk.verify(&material, &signature)
                .map_err(PairingError::from),
        )?;

        debug!(%device_id, "pair-setup: accessory identity verified");
        self.state = SetupState::Complete;

        Ok(AccessoryIdentity {
            device_id,
            public_key: *ltpk.as_bytes(),
        })
    }

    fn expect(
        &mut self,
        state: SetupState,
        stage: &'static str,
        expected: u8,
    ) -> Result<(), PairingError> {
        if self.state != state {
            self.state = SetupState::Failed;
            return Err(PairingError::Malformed {
                stage,
                detail: format!("machine not ready for state {expected}"),
            });
        }
        Ok(())
    }

    fn fail_on<T>(&mut self, result: Result<T, PairingError>) -> Result<T, PairingError> {
        if result.is_err() {
            self.state = SetupState::Failed;
        }
        result
    }
}

/// Normalise a PIN to the dashed `XXX-XX-XXX` form SRP hashes
///
/// # Errors
///
/// Returns an error unless the input is 8 digits, dashed or not.
pub fn normalize_pin(pin: &str) -> Result<String, PairingError> {
    let digits: Vec<u8> = pin.bytes().filter(u8::is_ascii_digit).collect();
    let dashes = pin.bytes().filter(|&b| b == b'-').count();

    if digits.len() != 8 || digits.len() + dashes != pin.len() {
        return Err(PairingError::InvalidPin(
            "expected 8 digits, optionally dashed as XXX-XX-XXX".into(),
        ));
    }

    let d = |r: std::ops::Range<usize>| String::from_utf8(digits[r].to_vec()).unwrap_or_default();
    Ok(format!("{}-{}-{}", d(0..3), d(3..5), d(5..8)))
}
