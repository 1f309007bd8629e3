//! mDNS discovery of HomeKit accessories
//!
//! Accessories advertise `_hap._tcp.local.`; the TXT record carries the
//! device-id, model and the status/feature flag bytes. Discovery has no
//! cryptographic role, it only produces addresses and flags.

mod browser;
mod parser;


pub use browser::{DeviceBrowser, DiscoveryEvent};

use std::time::Duration;

use futures::StreamExt;

use crate::error::{HapError, Result};
use crate::types::AccessoryDevice;

/// Service type accessories advertise
pub const HAP_SERVICE_TYPE: &str = "_hap._tcp.local.";

/// Browse for accessories for up to `duration` and collect the results
///
/// # Errors
///
/// Returns an error if the mDNS daemon cannot be started.
pub async fn discover(duration: Duration) -> Result<Vec<AccessoryDevice>> {
    let browser = DeviceBrowser::new()?;
    let mut stream = Box::pin(browser.browse()?);

    let mut devices: Vec<AccessoryDevice> = Vec::new();

    let _ = tokio::time::timeout(duration, async {
        while let Some(event) = stream.next().await {
            match event {
                DiscoveryEvent::Added(device) | DiscoveryEvent::Updated(device) => {
                    if let Some(existing) =
                        devices.iter_mut().find(|d| d.device_id == device.device_id)
                    {
                        *existing = device;
                    } else {
                        devices.push(device);
                    }
                }
                DiscoveryEvent::Removed(device_id) => {
                    devices.retain(|d| d.device_id != device_id);
                }
            }
        }
    })
    .await;

    Ok(devices)
}

/// Search for a specific accessory by device-id
///
/// # Errors
///
/// Returns an error if the device does not answer within `duration`.
pub async fn find_by_id(device_id: &str, duration: Duration) -> Result<AccessoryDevice> {
    let browser = DeviceBrowser::new()?;
    let mut stream = Box::pin(browser.browse()?);

    let search = async {
        while let Some(event) = stream.next().await {
            if let DiscoveryEvent::Added(device) | DiscoveryEvent::Updated(device) = event {
                if device.device_id == device_id {
                    return Some(device);
                }
            }
        }
        None
    };

    match tokio::time::timeout(duration, search).await {
        Ok(Some(device)) => Ok(device),
        _ => Err(HapError::transport(format!(
            "device {device_id} not found within {duration:?}"
        ))),
    }
}
