//! # homekit
//!
//! A controller-side implementation of the HomeKit Accessory Protocol
//! (HAP) over IP: discover accessories, pair with a setup PIN, establish
//! authenticated encrypted sessions, and read/write accessory attributes.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use homekit::client::{AccessoryClient, SetupClient};
//! use homekit::protocol::pairing::{MemoryStore, SetupMethod};
//! use homekit::types::{AccessoryPairingConfig, ControllerIdentity, IpConnectionInfo};
//!
//! # async fn example() -> homekit::Result<()> {
//! let controller = ControllerIdentity::generate();
//! let store = Arc::new(MemoryStore::new());
//!
//! // Find the accessory on the network
//! let device = homekit::discovery::find_by_id("5F-7A-CA-6A-83-92", Duration::from_secs(5)).await?;
//!
//! // Pair once with the setup PIN
//! let pairing = SetupClient::new()
//!     .pair(
//!         &controller,
//!         &AccessoryPairingConfig {
//!             device_id: device.device_id.clone(),
//!             pin: "123-44-321".into(),
//!             connection: IpConnectionInfo {
//!                 ip_address: device.primary_address().unwrap().to_string(),
//!                 port: device.port,
//!             },
//!         },
//!         SetupMethod::PairSetup,
//!         store.as_ref(),
//!     )
//!     .await?;
//!
//! // All later connections verify against the stored keys
//! let client = AccessoryClient::new(controller, pairing);
//! let accessories = client.accessories().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Error types
pub mod error;
/// Core identity and configuration types
pub mod types;

pub mod client;
pub mod discovery;
pub mod net;
pub mod protocol;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use client::{AccessoryClient, SetupClient};
pub use error::{HapError, Result};
pub use types::{AccessoryDevice, AccessoryPairing, ControllerIdentity};

pub use discovery::{discover, find_by_id};
