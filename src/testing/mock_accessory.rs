//! A minimal HAP accessory server: SRP pair-setup, pair-verify, the
//! encrypted record layer and a canned HTTP router. Just enough server to
//! exercise the controller end-to-end over real sockets.

use std::net::SocketAddr;
use std::sync::Arc;

use sha2::Sha512;
use srp::groups::G_3072;
use srp::server::SrpServer;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::net::secure::SecureStream;
use crate::protocol::crypto::{
    hkdf_labels, ChaChaCipher, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, HkdfSha512,
    Nonce, SrpClient, X25519KeyPair, X25519PublicKey, SRP_USERNAME,
};
use crate::protocol::pairing::setup::normalize_pin;
use crate::protocol::pairing::{methods, SessionKeys, TlvReader, TlvTag, TlvWriter};

/// How the mock answers PUT /characteristics
#[derive(Clone)]
pub enum WriteBehavior {
    /// `204 No Content`
    NoContent,
    /// `207 Multi-Status` with the given JSON body
    MultiStatus(String),
}

/// One paired controller on the accessory side
#[derive(Clone)]
struct PairedController {
    device_id: String,
    ltpk: [u8; 32],
    permissions: u8,
}

/// In-process HAP accessory
pub struct MockAccessory {
    device_id: String,
    pin: String,
    keypair: Ed25519KeyPair,
    /// Body served for GET /accessories
    pub accessories_body: std::sync::Mutex<String>,
    /// Status and body served for GET /characteristics
    pub read_response: std::sync::Mutex<(u16, String)>,
    /// Behaviour of PUT /characteristics
    pub write_behavior: std::sync::Mutex<WriteBehavior>,
    /// Drop the socket instead of answering when a controller removes itself
    pub reset_on_remove_self: std::sync::Mutex<bool>,
    /// Verify the client SRP proof in M3 before answering. Real accessories
    /// do; disabling it makes a wrong-PIN client proceed to M4 and fail its
    /// own check of the server proof instead.
    pub enforce_client_proof: std::sync::Mutex<bool>,
    paired: Mutex<Vec<PairedController>>,
}

impl MockAccessory {
    /// Create an accessory with the given identity and setup PIN
    pub fn new(device_id: &str, pin: &str) -> Arc<Self> {
        Arc::new(Self {
            device_id: device_id.to_string(),
            pin: pin.to_string(),
            keypair: Ed25519KeyPair::generate(),
            accessories_body: std::sync::Mutex::new(r#"{"accessories":[]}"#.to_string()),
            read_response: std::sync::Mutex::new((
                200,
                r#"{"characteristics":[]}"#.to_string(),
            )),
            write_behavior: std::sync::Mutex::new(WriteBehavior::NoContent),
            reset_on_remove_self: std::sync::Mutex::new(false),
            enforce_client_proof: std::sync::Mutex::new(true),
            paired: Mutex::new(Vec::new()),
        })
    }

    /// The accessory's long-term public key
    pub fn public_key(&self) -> [u8; 32] {
        *self.keypair.public_key().as_bytes()
    }

    /// Seed a paired controller so verify can run without a setup first
    pub async fn preset_controller(&self, device_id: &str, ltpk: [u8; 32], permissions: u8) {
        self.paired.lock().await.push(PairedController {
            device_id: device_id.to_string(),
            ltpk,
            permissions,
        });
    }

    /// The controllers currently paired
    pub async fn paired_controller_ids(&self) -> Vec<String> {
        self.paired.lock().await.iter().map(|c| c.device_id.clone()).collect()
    }

    /// Bind a local listener and serve connections until dropped
    pub async fn start(self: Arc<Self>) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let accessory = self;

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let accessory = Arc::clone(&accessory);
                tokio::spawn(async move {
                    accessory.handle_connection(stream).await;
                });
            }
        });

        Ok(addr)
    }

    async fn handle_connection(self: Arc<Self>, mut stream: TcpStream) {
        let mut setup = SetupServerState::Idle;
        let mut verify = VerifyServerState::Idle;

        loop {
            let request = match read_request(&mut stream).await {
                Ok(Some(request)) => request,
                _ => return,
            };

            match request.path.as_str() {
                "/pair-setup" => {
                    let body = self.handle_setup(&mut setup, &request.body).await;
                    if write_tlv_response(&mut stream, &body).await.is_err() {
                        return;
                    }
                }
                "/pair-verify" => match self.handle_verify(&mut verify, &request.body).await {
                    VerifyOutcome::Reply(body) => {
                        if write_tlv_response(&mut stream, &body).await.is_err() {
                            return;
                        }
                    }
                    VerifyOutcome::Established {
                        reply,
                        keys,
                        controller_id,
                    } => {
                        if write_tlv_response(&mut stream, &reply).await.is_err() {
                            return;
                        }
                        let mut secure = SecureStream::new(stream, &keys);
                        self.serve_encrypted(&mut secure, &controller_id).await;
                        return;
                    }
                },
                _ => {
                    if write_response(&mut stream, 404, "Not Found", None, b"")
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }
    }

    // ---- pair-setup server role ----

    async fn handle_setup(&self, state: &mut SetupServerState, body: &[u8]) -> Vec<u8> {
        let Ok(tlv) = TlvReader::decode(body) else {
            return setup_error(2, 1);
        };
        let Ok(msg_state) = tlv.state() else {
            return setup_error(2, 1);
        };

        match msg_state {
            1 => {
                let password = normalize_pin(&self.pin).expect("mock PIN");
                let salt: [u8; 16] = rand::random();
                let verifier =
                    SrpClient::compute_verifier(SRP_USERNAME, password.as_bytes(), &salt);
                let b_secret: [u8; 64] = {
                    let mut b = [0u8; 64];
                    use rand::RngCore;
                    rand::thread_rng().fill_bytes(&mut b);
                    b
                };
                let server = SrpServer::<Sha512>::new(&G_3072);
                let b_pub = server.compute_public_ephemeral(&b_secret, &verifier);

                *state = SetupServerState::SentM2 { verifier, b_secret };

                TlvWriter::new()
                    .add_state(2)
                    .add(TlvTag::Salt, &salt)
                    .add(TlvTag::PublicKey, &b_pub)
                    .build()
            }
            3 => {
                let SetupServerState::SentM2 {
                    verifier, b_secret, ..
                } = std::mem::replace(state, SetupServerState::Idle)
                else {
                    return setup_error(4, 1);
                };

                let (Ok(a_pub), Ok(proof)) = (
                    tlv.get_required(TlvTag::PublicKey),
                    tlv.get_required(TlvTag::Proof),
                ) else {
                    return setup_error(4, 1);
                };

                let server = SrpServer::<Sha512>::new(&G_3072);
                let Ok(session) = server.process_reply(&b_secret, &verifier, a_pub) else {
                    return setup_error(4, 2);
                };

                if *self.enforce_client_proof.lock().unwrap()
                    && session.verify_client(proof).is_err()
                {
                    return setup_error(4, 2);
                }

                let m2_proof = session.proof().to_vec();
                *state = SetupServerState::SentM4 {
                    shared_key: session.key().to_vec(),
                };

                TlvWriter::new()
                    .add_state(4)
                    .add(TlvTag::Proof, &m2_proof)
                    .build()
            }
            5 => {
                let SetupServerState::SentM4 { shared_key } =
                    std::mem::replace(state, SetupServerState::Idle)
                else {
                    return setup_error(6, 1);
                };

                let Ok(sealed) = tlv.get_required(TlvTag::EncryptedData) else {
                    return setup_error(6, 1);
                };

                let encrypt_key = HkdfSha512::new(hkdf_labels::SETUP_ENCRYPT_SALT, &shared_key)
                    .expand_fixed::<32>(hkdf_labels::SETUP_ENCRYPT_INFO)
                    .expect("hkdf");
                let cipher = ChaChaCipher::new(&encrypt_key).expect("cipher");

                let Ok(opened) = cipher.open(&Nonce::from_label(b"PS-Msg05"), sealed) else {
                    return setup_error(6, 2);
                };
                let Ok(sub) = TlvReader::decode(&opened) else {
                    return setup_error(6, 1);
                };
                let (Ok(id), Ok(ltpk), Ok(signature)) = (
                    sub.get_required(TlvTag::Identifier),
                    sub.get_required(TlvTag::PublicKey),
                    sub.get_required(TlvTag::Signature),
                ) else {
                    return setup_error(6, 1);
                };

                let prefix =
                    HkdfSha512::new(hkdf_labels::SETUP_CONTROLLER_SIGN_SALT, &shared_key)
                        .expand_fixed::<32>(hkdf_labels::SETUP_CONTROLLER_SIGN_INFO)
                        .expect("hkdf");
                let mut material = prefix.to_vec();
                material.extend_from_slice(id);
                material.extend_from_slice(ltpk);

                let verified = Ed25519PublicKey::from_bytes(ltpk)
                    .and_then(|key| {
                        Ed25519Signature::from_bytes(signature)
                            .and_then(|sig| key.verify(&material, &sig))
                    })
                    .is_ok();
                if !verified {
                    return setup_error(6, 2);
                }

                let mut ltpk_arr = [0u8; 32];
                ltpk_arr.copy_from_slice(ltpk);
                self.paired.lock().await.push(PairedController {
                    device_id: String::from_utf8_lossy(id).to_string(),
                    ltpk: ltpk_arr,
                    permissions: 1,
                });

                // Accessory identity, sealed the mirror way
                let prefix = HkdfSha512::new(hkdf_labels::SETUP_ACCESSORY_SIGN_SALT, &shared_key)
                    .expand_fixed::<32>(hkdf_labels::SETUP_ACCESSORY_SIGN_INFO)
                    .expect("hkdf");
                let mut material = prefix.to_vec();
                material.extend_from_slice(self.device_id.as_bytes());
                material.extend_from_slice(self.keypair.public_key().as_bytes());
                let signature = self.keypair.sign(&material);

                let sub = TlvWriter::new()
                    .add(TlvTag::Identifier, self.device_id.as_bytes())
                    .add(TlvTag::PublicKey, self.keypair.public_key().as_bytes())
                    .add(TlvTag::Signature, &signature.to_bytes())
                    .build();
                let sealed = cipher
                    .seal(&Nonce::from_label(b"PS-Msg06"), &sub)
                    .expect("seal");

                TlvWriter::new()
                    .add_state(6)
                    .add(TlvTag::EncryptedData, &sealed)
                    .build()
            }
            other => setup_error(other.wrapping_add(1), 1),
        }
    }

    // ---- pair-verify server role ----

    async fn handle_verify(&self, state: &mut VerifyServerState, body: &[u8]) -> VerifyOutcome {
        let Ok(tlv) = TlvReader::decode(body) else {
            return VerifyOutcome::Reply(verify_error(2, 1));
        };
        let Ok(msg_state) = tlv.state() else {
            return VerifyOutcome::Reply(verify_error(2, 1));
        };

        match msg_state {
            1 => {
                let Ok(controller_ephemeral) = tlv.get_required(TlvTag::PublicKey) else {
                    return VerifyOutcome::Reply(verify_error(2, 1));
                };
                let Ok(their_public) = X25519PublicKey::from_bytes(controller_ephemeral) else {
                    return VerifyOutcome::Reply(verify_error(2, 1));
                };

                let ephemeral = X25519KeyPair::generate();
                let our_public = *ephemeral.public_key().as_bytes();
                let shared = ephemeral.diffie_hellman(&their_public);

                let verify_key =
                    HkdfSha512::new(hkdf_labels::VERIFY_ENCRYPT_SALT, shared.as_bytes())
                        .expand_fixed::<32>(hkdf_labels::VERIFY_ENCRYPT_INFO)
                        .expect("hkdf");
                let cipher = ChaChaCipher::new(&verify_key).expect("cipher");

                // Sign: our ephemeral, our id, controller's ephemeral
                let mut material = our_public.to_vec();
                material.extend_from_slice(self.device_id.as_bytes());
                material.extend_from_slice(controller_ephemeral);
                let signature = self.keypair.sign(&material);

                let sub = TlvWriter::new()
                    .add(TlvTag::Identifier, self.device_id.as_bytes())
                    .add(TlvTag::Signature, &signature.to_bytes())
                    .build();
                let sealed = cipher
                    .seal(&Nonce::from_label(b"PV-Msg02"), &sub)
                    .expect("seal");

                let reply = TlvWriter::new()
                    .add_state(2)
                    .add(TlvTag::PublicKey, &our_public)
                    .add(TlvTag::EncryptedData, &sealed)
                    .build();

                *state = VerifyServerState::SentM2 {
                    shared: *shared.as_bytes(),
                    verify_key,
                    our_public,
                    their_public: {
                        let mut arr = [0u8; 32];
                        arr.copy_from_slice(controller_ephemeral);
                        arr
                    },
                };

                VerifyOutcome::Reply(reply)
            }
            3 => {
                let VerifyServerState::SentM2 {
                    shared,
                    verify_key,
                    our_public,
                    their_public,
                } = std::mem::replace(state, VerifyServerState::Idle)
                else {
                    return VerifyOutcome::Reply(verify_error(4, 1));
                };

                let Ok(sealed) = tlv.get_required(TlvTag::EncryptedData) else {
                    return VerifyOutcome::Reply(verify_error(4, 1));
                };

                let cipher = ChaChaCipher::new(&verify_key).expect("cipher");
                let Ok(opened) = cipher.open(&Nonce::from_label(b"PV-Msg03"), sealed) else {
                    return VerifyOutcome::Reply(verify_error(4, 2));
                };
                let Ok(sub) = TlvReader::decode(&opened) else {
                    return VerifyOutcome::Reply(verify_error(4, 1));
                };
                let (Ok(id), Ok(signature)) = (
                    sub.get_required(TlvTag::Identifier),
                    sub.get_required(TlvTag::Signature),
                ) else {
                    return VerifyOutcome::Reply(verify_error(4, 1));
                };

                let id = String::from_utf8_lossy(id).to_string();
                let Some(controller) = self
                    .paired
                    .lock()
                    .await
                    .iter()
                    .find(|c| c.device_id == id)
                    .cloned()
                else {
                    return VerifyOutcome::Reply(verify_error(4, 2));
                };

                // Controller signs: its ephemeral, its id, our ephemeral
                let mut material = their_public.to_vec();
                material.extend_from_slice(id.as_bytes());
                material.extend_from_slice(&our_public);

                let verified = Ed25519PublicKey::from_bytes(&controller.ltpk)
                    .and_then(|key| {
                        Ed25519Signature::from_bytes(signature)
                            .and_then(|sig| key.verify(&material, &sig))
                    })
                    .is_ok();
                if !verified {
                    return VerifyOutcome::Reply(verify_error(4, 2));
                }

                let hkdf = HkdfSha512::new(hkdf_labels::CONTROL_SALT, &shared);
                let controller_keys = SessionKeys {
                    write_key: hkdf
                        .expand_fixed::<32>(hkdf_labels::CONTROL_WRITE_INFO)
                        .expect("hkdf"),
                    read_key: hkdf
                        .expand_fixed::<32>(hkdf_labels::CONTROL_READ_INFO)
                        .expect("hkdf"),
                };

                VerifyOutcome::Established {
                    reply: TlvWriter::new().add_state(4).build(),
                    keys: controller_keys.swapped(),
                    controller_id: id,
                }
            }
            _ => VerifyOutcome::Reply(verify_error(4, 1)),
        }
    }

    // ---- encrypted request routing ----

    async fn serve_encrypted(&self, stream: &mut SecureStream<TcpStream>, session_controller: &str) {
        loop {
            let request = match read_request(stream).await {
                Ok(Some(request)) => request,
                _ => return,
            };

            let result = match (request.method.as_str(), request.path.as_str()) {
                ("GET", "/accessories") => {
                    let body = self.accessories_body.lock().unwrap().clone();
                    write_response(stream, 200, "OK", Some("application/hap+json"), body.as_bytes())
                        .await
                }
                ("GET", path) if path.starts_with("/characteristics") => {
                    let (status, body) = self.read_response.lock().unwrap().clone();
                    let reason = if status == 207 { "Multi-Status" } else { "OK" };
                    write_response(
                        stream,
                        status,
                        reason,
                        Some("application/hap+json"),
                        body.as_bytes(),
                    )
                    .await
                }
                ("PUT", "/characteristics") => {
                    let behavior = self.write_behavior.lock().unwrap().clone();
                    match behavior {
                        WriteBehavior::NoContent => {
                            write_response(stream, 204, "No Content", None, b"").await
                        }
                        WriteBehavior::MultiStatus(body) => {
                            write_response(
                                stream,
                                207,
                                "Multi-Status",
                                Some("application/hap+json"),
                                body.as_bytes(),
                            )
                            .await
                        }
                    }
                }
                ("POST", "/pairings") => {
                    let Some(body) = self.handle_pairings(&request.body, session_controller).await
                    else {
                        // Connection-reset simulation for remove-self
                        return;
                    };
                    write_tlv_response(stream, &body).await
                }
                _ => write_response(stream, 404, "Not Found", None, b"").await,
            };

            if result.is_err() {
                return;
            }
        }
    }

    /// Returns None when the connection should be dropped without replying
    async fn handle_pairings(&self, body: &[u8], session_controller: &str) -> Option<Vec<u8>> {
        let Ok(tlv) = TlvReader::decode(body) else {
            return Some(setup_error(2, 1));
        };
        let method = tlv.get_byte(TlvTag::Method).unwrap_or(0xFE);

        match method {
            methods::LIST_PAIRINGS => {
                let paired = self.paired.lock().await.clone();
                let mut writer = TlvWriter::new().add_state(2);
                for (index, controller) in paired.iter().enumerate() {
                    if index > 0 {
                        writer = writer.add_separator();
                    }
                    writer = writer
                        .add(TlvTag::Identifier, controller.device_id.as_bytes())
                        .add(TlvTag::PublicKey, &controller.ltpk)
                        .add_byte(TlvTag::Permissions, controller.permissions);
                }
                Some(writer.build())
            }
            methods::ADD_PAIRING => {
                let (Ok(id), Ok(ltpk)) = (
                    tlv.get_required(TlvTag::Identifier),
                    tlv.get_required(TlvTag::PublicKey),
                ) else {
                    return Some(setup_error(2, 1));
                };
                let mut ltpk_arr = [0u8; 32];
                if ltpk.len() != 32 {
                    return Some(setup_error(2, 1));
                }
                ltpk_arr.copy_from_slice(ltpk);
                self.paired.lock().await.push(PairedController {
                    device_id: String::from_utf8_lossy(id).to_string(),
                    ltpk: ltpk_arr,
                    permissions: tlv.get_byte(TlvTag::Permissions).unwrap_or(0),
                });
                Some(TlvWriter::new().add_state(2).build())
            }
            methods::REMOVE_PAIRING => {
                let Ok(id) = tlv.get_required(TlvTag::Identifier) else {
                    return Some(setup_error(2, 1));
                };
                let id = String::from_utf8_lossy(id).to_string();
                let mut paired = self.paired.lock().await;
                paired.retain(|c| c.device_id != id);
                drop(paired);

                if id == session_controller && *self.reset_on_remove_self.lock().unwrap() {
                    return None;
                }
                Some(TlvWriter::new().add_state(2).build())
            }
            _ => Some(setup_error(2, 1)),
        }
    }
}

enum SetupServerState {
    Idle,
    SentM2 {
        verifier: Vec<u8>,
        b_secret: [u8; 64],
    },
    SentM4 {
        shared_key: Vec<u8>,
    },
}

enum VerifyServerState {
    Idle,
    SentM2 {
        shared: [u8; 32],
        verify_key: [u8; 32],
        our_public: [u8; 32],
        their_public: [u8; 32],
    },
}

enum VerifyOutcome {
    Reply(Vec<u8>),
    Established {
        reply: Vec<u8>,
        keys: SessionKeys,
        controller_id: String,
    },
}

fn setup_error(state: u8, code: u8) -> Vec<u8> {
    TlvWriter::new()
        .add_state(state)
        .add_byte(TlvTag::Error, code)
        .build()
}

fn verify_error(state: u8, code: u8) -> Vec<u8> {
    setup_error(state, code)
}

// ---- server-side HTTP plumbing ----

struct ParsedRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

async fn read_request<S: AsyncRead + Unpin>(
    stream: &mut S,
) -> std::io::Result<Option<ParsedRequest>> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let header_text = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = header_text.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default();
    let path = target.split('?').next().unwrap_or(target).to_string();

    let mut content_length = 0usize;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let mut body = buffer[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(Some(ParsedRequest { method, path, body }))
}

async fn write_response<S: AsyncWrite + Unpin>(
    stream: &mut S,
    status: u16,
    reason: &str,
    content_type: Option<&str>,
    body: &[u8],
) -> std::io::Result<()> {
    let mut response = format!("HTTP/1.1 {status} {reason}\r\n");
    if let Some(content_type) = content_type {
        response.push_str(&format!("Content-Type: {content_type}\r\n"));
    }
    if status != 204 {
        response.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    response.push_str("\r\n");

    stream.write_all(response.as_bytes()).await?;
    if status != 204 {
        stream.write_all(body).await?;
    }
    stream.flush().await
}

async fn write_tlv_response<S: AsyncWrite + Unpin>(
    stream: &mut S,
    body: &[u8],
) -> std::io::Result<()> {
    write_response(stream, 200, "OK", Some("application/pairing+tlv8"), body).await
}
