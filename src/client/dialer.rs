//! Secure dialer: connect, verify, upgrade to the encrypted transport
//!
//! The dialer owns exactly one connection per accessory client. Pair-Verify
//! runs as plaintext HTTP POSTs written directly over the raw socket (no
//! connection pool to reclaim the stream from); the derived keys then wrap
//! the same socket for all further traffic. A mutex guards the cached
//! connection so concurrent first requests collapse to one handshake and
//! requests are serialised, HTTP/1.1 without pipelining.

use std::io;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::HapError;
use crate::net::http::{self, content_types, names, HttpError, HttpRequest, Method};
use crate::net::secure::SecureStream;
use crate::net::{HttpResponse, StatusCode};
use crate::protocol::pairing::PairVerify;
use crate::types::{AccessoryPairing, ControllerIdentity};

/// Produces the underlying TCP connection
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open a connection to `addr` (`host:port`)
    async fn dial(&self, addr: &str) -> io::Result<TcpStream>;
}

/// Plain TCP dialer
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, addr: &str) -> io::Result<TcpStream> {
        TcpStream::connect(addr).await
    }
}

enum Connection {
    Idle,
    Ready(Box<SecureStream<TcpStream>>),
    Closed,
}

/// A failed request, annotated with whether the request bytes had been
/// fully written before the connection dropped
pub(crate) struct RequestFailure {
    pub error: HapError,
    pub disconnect_after_write: bool,
}

impl RequestFailure {
    fn plain(error: HapError) -> Self {
        Self {
            error,
            disconnect_after_write: false,
        }
    }
}

impl From<HapError> for RequestFailure {
    fn from(error: HapError) -> Self {
        Self::plain(error)
    }
}

/// Dialer holding one verified, encrypted connection to one accessory
pub struct SecureDialer {
    dialer: Box<dyn Dialer>,
    controller: ControllerIdentity,
    accessory: AccessoryPairing,
    connection: Mutex<Connection>,
}

impl std::fmt::Debug for SecureDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureDialer")
            .field("controller", &self.controller)
            .field("accessory", &self.accessory)
            .finish_non_exhaustive()
    }
}

impl SecureDialer {
    /// Create a dialer; no connection is opened until the first request
    pub fn new(
        dialer: impl Dialer + 'static,
        controller: ControllerIdentity,
        accessory: AccessoryPairing,
    ) -> Self {
        Self {
            dialer: Box::new(dialer),
            controller,
            accessory,
            connection: Mutex::new(Connection::Idle),
        }
    }

    /// The accessory's `host:port`
    #[must_use]
    pub fn addr(&self) -> String {
        self.accessory.connection.to_addr_string()
    }

    /// The controller's device-id
    #[must_use]
    pub fn controller_id(&self) -> &str {
        &self.controller.device_id
    }

    /// Run one request over the cached connection, establishing it first if
    /// necessary. A failed exchange tears the connection down; the next
    /// request re-dials.
    pub(crate) async fn request(
        &self,
        request: &HttpRequest,
    ) -> Result<HttpResponse, RequestFailure> {
        let mut guard = self.connection.lock().await;

        if matches!(*guard, Connection::Closed) {
            return Err(RequestFailure::plain(HapError::Cancelled));
        }

        if matches!(*guard, Connection::Idle) {
            let stream = self.establish().await?;
            *guard = Connection::Ready(Box::new(stream));
        }

        let Connection::Ready(stream) = &mut *guard else {
            return Err(RequestFailure::plain(HapError::Cancelled));
        };

        match http::exchange(stream.as_mut(), request).await {
            Ok(response) => Ok(response),
            Err(error) => {
                let disconnect_after_write = error.is_disconnect_after_write();
                *guard = Connection::Idle;
                Err(RequestFailure {
                    error: http_error_to_hap(error),
                    disconnect_after_write,
                })
            }
        }
    }

    /// Close the connection and refuse further requests
    pub async fn close(&self) {
        let mut guard = self.connection.lock().await;
        *guard = Connection::Closed;
    }

    /// Dial and run Pair-Verify, returning the wrapped socket
    async fn establish(&self) -> Result<SecureStream<TcpStream>, HapError> {
        let addr = self.addr();
        debug!(%addr, device_id = %self.accessory.device_id, "dialing accessory");

        let mut stream = self.dialer.dial(&addr).await?;

        let mut verify = PairVerify::new(
            &self.controller,
            &self.accessory.device_id,
            &self.accessory.public_key,
        )?;

        let m1 = verify.start_message()?;
        let m2 = post_pairing_tlv(&mut stream, &addr, "/pair-verify", m1).await?;
        let m3 = verify.handle_m2(&m2)?;
        let m4 = post_pairing_tlv(&mut stream, &addr, "/pair-verify", m3).await?;
        let keys = verify.handle_m4(&m4)?;

        debug!(%addr, "pair-verify complete, upgrading to encrypted transport");
        Ok(SecureStream::new(stream, &keys))
    }
}

/// POST a pairing TLV over any byte stream and return the response body
///
/// Shared by the verify handshake here and the setup client, both of which
/// speak plaintext HTTP before any session exists.
pub(crate) async fn post_pairing_tlv<S>(
    stream: &mut S,
    host: &str,
    path: &str,
    body: Vec<u8>,
) -> Result<Vec<u8>, HapError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let request = HttpRequest::new(Method::Post, path)
        .header(names::HOST, host)
        .body(content_types::PAIRING_TLV8, body);

    let response = http::exchange(stream, &request)
        .await
        .map_err(http_error_to_hap)?;

    if response.status != StatusCode::OK {
        return Err(HapError::status(response.status.as_u16()));
    }

    Ok(response.body)
}

/// Collapse an exchange failure into the crate error model
pub(crate) fn http_error_to_hap(error: HttpError) -> HapError {
    match error {
        HttpError::Io { source, .. } => HapError::from(source),
        HttpError::Codec(e) => HapError::Transport {
            message: e.to_string(),
            status: None,
            source: Some(Box::new(e)),
        },
    }
}
