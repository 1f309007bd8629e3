//! Pairing administration over the encrypted session

use tracing::debug;

use super::AccessoryClient;
use crate::error::{HapError, Result};
use crate::net::http::{content_types, Method};
use crate::net::StatusCode;
use crate::protocol::pairing::admin;
use crate::protocol::pairing::PairingEntry;

impl AccessoryClient {
    /// List the controllers paired with the accessory
    ///
    /// # Errors
    ///
    /// Fails on transport errors, a non-`200` status, or an accessory error
    /// code in the response.
    pub async fn list_pairings(&self) -> Result<Vec<PairingEntry>> {
        let body = self.post_pairings(admin::list_pairings_request()).await?;
        Ok(admin::parse_list_response(&body)?)
    }

    /// Grant an additional controller access to the accessory
    ///
    /// # Errors
    ///
    /// Fails on transport errors or an accessory error code; error 2
    /// typically means the requesting controller lacks admin permissions.
    pub async fn add_pairing(&self, entry: &PairingEntry) -> Result<()> {
        let body = self.post_pairings(admin::add_pairing_request(entry)).await?;
        Ok(admin::parse_status_response(&body, "add-pairing")?)
    }

    /// Remove a controller's pairing
    ///
    /// An accessory may drop the connection the instant it removes the
    /// *requesting* controller's own pairing; a disconnect after the request
    /// was fully written is reported as success in exactly that case.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or an accessory error code.
    pub async fn remove_pairing(&self, controller_device_id: &str) -> Result<()> {
        let request = self
            .request(Method::Post, "/pairings")
            .body(
                content_types::PAIRING_TLV8,
                admin::remove_pairing_request(controller_device_id),
            );

        let removing_self = controller_device_id == self.dialer.controller_id();

        let response = match self.dialer.request(&request).await {
            Ok(response) => response,
            Err(failure) if removing_self && failure.disconnect_after_write => {
                debug!(
                    device_id = controller_device_id,
                    "connection reset after removing own pairing, treating as success"
                );
                return Ok(());
            }
            Err(failure) => return Err(failure.error),
        };

        if response.status != StatusCode::OK {
            return Err(HapError::status(response.status.as_u16()));
        }

        Ok(admin::parse_status_response(&response.body, "remove-pairing")?)
    }

    async fn post_pairings(&self, body: Vec<u8>) -> Result<Vec<u8>> {
        let request = self
            .request(Method::Post, "/pairings")
            .body(content_types::PAIRING_TLV8, body);

        let response = self.send(&request).await?;

        if response.status != StatusCode::OK {
            return Err(HapError::status(response.status.as_u16()));
        }

        Ok(response.body)
    }
}
