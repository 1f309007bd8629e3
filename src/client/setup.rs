//! One-shot Pair-Setup driver
//!
//! Runs the six-message exchange as three plaintext HTTP POSTs to
//! `/pair-setup` and persists the learned accessory identity.

use tracing::{debug, warn};

use super::dialer::{post_pairing_tlv, Dialer, TcpDialer};
use crate::error::Result;
use crate::protocol::pairing::{PairSetup, PairingStore, SetupMethod};
use crate::types::{AccessoryPairing, AccessoryPairingConfig, ControllerIdentity};

/// Client that negotiates the initial pairing with an accessory
pub struct SetupClient<D = TcpDialer> {
    dialer: D,
}

impl SetupClient<TcpDialer> {
    /// Create a setup client using plain TCP
    #[must_use]
    pub fn new() -> Self {
        Self { dialer: TcpDialer }
    }
}

impl Default for SetupClient<TcpDialer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dialer> SetupClient<D> {
    /// Create a setup client with an injected dialer
    pub fn with_dialer(dialer: D) -> Self {
        Self { dialer }
    }

    /// Pair `controller` with the accessory described by `config`
    ///
    /// On success the accessory's identity is written to `store` and the
    /// resulting pairing (identity plus address) is returned. Nothing is
    /// persisted on any failure path.
    ///
    /// # Errors
    ///
    /// Surfaces accessory error codes (already-paired, busy with its retry
    /// delay), SRP proof mismatches for a wrong PIN, and transport errors.
    pub async fn pair(
        &self,
        controller: &ControllerIdentity,
        config: &AccessoryPairingConfig,
        method: SetupMethod,
        store: &dyn PairingStore,
    ) -> Result<AccessoryPairing> {
        let addr = config.connection.to_addr_string();
        debug!(%addr, device_id = %config.device_id, "starting pair-setup");

        let mut stream = self.dialer.dial(&addr).await?;
        let mut machine = PairSetup::new(controller, &config.pin, method)?;

        let m1 = machine.start_message()?;
        let m2 = post_pairing_tlv(&mut stream, &addr, "/pair-setup", m1).await?;
        let m3 = machine.handle_m2(&m2)?;
        let m4 = post_pairing_tlv(&mut stream, &addr, "/pair-setup", m3).await?;
        let m5 = machine.handle_m4(&m4)?;
        let m6 = post_pairing_tlv(&mut stream, &addr, "/pair-setup", m5).await?;
        let identity = machine.handle_m6(&m6)?;

        if !config.device_id.is_empty() && identity.device_id != config.device_id {
            warn!(
                expected = %config.device_id,
                actual = %identity.device_id,
                "accessory reported a different device-id than discovery"
            );
        }

        let pairing = AccessoryPairing {
            name: identity.device_id.clone(),
            device_id: identity.device_id,
            public_key: identity.public_key.to_vec(),
            connection: config.connection.clone(),
        };

        store.save(pairing.clone()).await?;
        debug!(device_id = %pairing.device_id, "pair-setup complete, pairing stored");

        Ok(pairing)
    }
}
