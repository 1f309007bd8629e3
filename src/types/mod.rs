//! Core identity and configuration types

mod config;
mod device;


pub use config::{
    AccessoryPairing, AccessoryPairingConfig, ControllerIdentity, IpConnectionInfo,
};
pub use device::{AccessoryDevice, FeatureFlags, StatusFlags};
