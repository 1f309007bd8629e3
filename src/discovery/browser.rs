//! mDNS browser stream

use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;

use super::parser;
use crate::error::{HapError, Result};
use crate::types::AccessoryDevice;

/// Discovery events
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A new accessory was resolved
    Added(AccessoryDevice),
    /// A known accessory re-resolved with changed data
    Updated(AccessoryDevice),
    /// An accessory went offline; carries its device-id
    Removed(String),
}

/// Browser for `_hap._tcp` services
pub struct DeviceBrowser {
    daemon: mdns_sd::ServiceDaemon,
}

impl DeviceBrowser {
    /// Start the mDNS daemon
    ///
    /// # Errors
    ///
    /// Returns a transport error if the daemon cannot be created.
    pub fn new() -> Result<Self> {
        let daemon = mdns_sd::ServiceDaemon::new()
            .map_err(|e| HapError::transport(format!("start mDNS daemon: {e}")))?;
        Ok(Self { daemon })
    }

    /// Begin browsing; events stream until dropped
    ///
    /// # Errors
    ///
    /// Returns a transport error if browsing cannot be started.
    pub fn browse(self) -> Result<impl Stream<Item = DiscoveryEvent>> {
        let receiver = self
            .daemon
            .browse(super::HAP_SERVICE_TYPE)
            .map_err(|e| HapError::transport(format!("browse {}: {e}", super::HAP_SERVICE_TYPE)))?;

        Ok(BrowserStream {
            _daemon: self.daemon,
            events: Box::new(receiver.into_stream()),
            known: HashMap::new(),
            fullname_to_id: HashMap::new(),
        })
    }
}

struct BrowserStream {
    // Held so the daemon outlives the stream
    _daemon: mdns_sd::ServiceDaemon,
    events: Box<dyn Stream<Item = mdns_sd::ServiceEvent> + Send + Unpin>,
    known: HashMap<String, AccessoryDevice>,
    fullname_to_id: HashMap<String, String>,
}

impl BrowserStream {
    fn process(&mut self, event: mdns_sd::ServiceEvent) -> Option<DiscoveryEvent> {
        match event {
            mdns_sd::ServiceEvent::ServiceResolved(info) => self.handle_resolved(&info),
            mdns_sd::ServiceEvent::ServiceRemoved(_, fullname) => {
                let device_id = self.fullname_to_id.remove(&fullname)?;
                self.known.remove(&device_id)?;
                Some(DiscoveryEvent::Removed(device_id))
            }
            _ => None,
        }
    }

    fn handle_resolved(&mut self, info: &mdns_sd::ServiceInfo) -> Option<DiscoveryEvent> {
        let fullname = info.get_fullname().to_string();

        let txt: HashMap<String, String> = info
            .get_properties()
            .iter()
            .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
            .collect();

        let addresses: Vec<std::net::IpAddr> = info.get_addresses().iter().copied().collect();
        if addresses.is_empty() {
            return None;
        }

        let instance_name = fullname
            .split('.')
            .next()
            .unwrap_or(&fullname)
            .to_string();

        let device = parser::device_from_txt(instance_name, addresses, info.get_port(), &txt);

        self.fullname_to_id
            .insert(fullname, device.device_id.clone());

        match self.known.insert(device.device_id.clone(), device.clone()) {
            None => Some(DiscoveryEvent::Added(device)),
            Some(_) => Some(DiscoveryEvent::Updated(device)),
        }
    }
}

impl Stream for BrowserStream {
    type Item = DiscoveryEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match Pin::new(&mut this.events).poll_next(cx) {
                Poll::Ready(Some(event)) => {
                    if let Some(discovery_event) = this.process(event) {
                        return Poll::Ready(Some(discovery_event));
                    }
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
