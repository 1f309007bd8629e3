//! Accessory client: JSON attribute calls and pairing administration over
//! an authenticated, encrypted connection

mod accessories;
mod characteristics;
pub mod dialer;
mod pairings;
mod setup;
mod value;

#[cfg(test)]
mod tests;

pub use accessories::{RawAccessory, RawCharacteristic, RawService};
pub use characteristics::{
    CharacteristicId, CharacteristicReadResponse, CharacteristicWrite,
    CharacteristicWriteResponse, CharacteristicsReadRequest, CharacteristicsWriteRequest,
};
pub use dialer::{Dialer, SecureDialer, TcpDialer};
pub use setup::SetupClient;
pub use value::{Value, ValueError};

use std::sync::Arc;

use crate::error::{HapError, Result};
use crate::net::http::{names, HttpRequest, Method};
use crate::net::HttpResponse;
use crate::protocol::pairing::PairingStore;
use crate::types::{AccessoryPairing, ControllerIdentity};

/// Client for one paired accessory
///
/// Owns a single encrypted connection through its [`SecureDialer`];
/// concurrent calls are serialised on that connection.
#[derive(Debug)]
pub struct AccessoryClient {
    dialer: SecureDialer,
}

impl AccessoryClient {
    /// Create a client using plain TCP
    #[must_use]
    pub fn new(controller: ControllerIdentity, accessory: AccessoryPairing) -> Self {
        Self::with_dialer(TcpDialer, controller, accessory)
    }

    /// Create a client with an injected dialer
    pub fn with_dialer(
        dialer: impl Dialer + 'static,
        controller: ControllerIdentity,
        accessory: AccessoryPairing,
    ) -> Self {
        Self {
            dialer: SecureDialer::new(dialer, controller, accessory),
        }
    }

    /// Create a client for a device-id found in the pairing store
    ///
    /// # Errors
    ///
    /// Returns [`HapError::UnknownPeer`] when no pairing is on record.
    pub async fn from_store(
        controller: ControllerIdentity,
        store: Arc<dyn PairingStore>,
        device_id: &str,
    ) -> Result<Self> {
        let pairing = store
            .load(device_id)
            .await?
            .ok_or_else(|| HapError::UnknownPeer {
                device_id: device_id.to_string(),
            })?;

        Ok(Self::new(controller, pairing))
    }

    /// Close the connection; subsequent calls fail as cancelled
    pub async fn close(&self) {
        self.dialer.close().await;
    }

    pub(crate) fn request(&self, method: Method, path: impl Into<String>) -> HttpRequest {
        HttpRequest::new(method, path).header(names::HOST, self.dialer.addr())
    }

    pub(crate) async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.dialer.request(request).await.map_err(|f| f.error)
    }
}
