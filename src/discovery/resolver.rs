//! Command resolver.
//!
//! Maps a (location, group, name) triple to a device handle: the registry is
//! consulted first, with no liveness check; on a miss a fresh discovery
//! sweep is scanned for a case-insensitive match.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::DeviceRegistry;
use crate::device::{Device, DeviceInfo, DeviceTransport};
use crate::topic::{self, TopicAddress};

/// Resolves topic addresses to devices.
pub struct CommandResolver {
    prefix: String,
    resolve_wait: Duration,
    transport: Arc<dyn DeviceTransport>,
    registry: Arc<DeviceRegistry>,
}

impl CommandResolver {
    pub fn new(
        prefix: impl Into<String>,
        resolve_wait: Duration,
        transport: Arc<dyn DeviceTransport>,
        registry: Arc<DeviceRegistry>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            resolve_wait,
            transport,
            registry,
        }
    }

    /// Resolve `address` to a device, or `None` if nothing matches.
    ///
    /// Transport errors are logged and reported as `None`.
    pub async fn resolve(&self, address: &TopicAddress) -> Option<Arc<dyn Device>> {
        if let Some(device) = self.from_registry(address).await {
            return Some(device);
        }
        self.from_discovery(address).await
    }

    async fn from_registry(&self, address: &TopicAddress) -> Option<Arc<dyn Device>> {
        let topic = topic::encode(&self.prefix, address);
        let entry = self.registry.lookup(&topic).await?;

        let info = DeviceInfo {
            label: Some(entry.address.name.clone()),
            group: Some(entry.address.group.clone()),
            location: Some(entry.address.location.clone()),
        };
        match self.transport.create_device(entry.identity, info) {
            Ok(device) => {
                debug!(topic = %topic, device = %entry.identity, "Resolved from registry");
                Some(device)
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Could not create device from registry entry");
                None
            }
        }
    }

    async fn from_discovery(&self, address: &TopicAddress) -> Option<Arc<dyn Device>> {
        let devices = match self.transport.discover(self.resolve_wait).await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(address = %address, error = %e, "Discovery failed while resolving");
                return None;
            }
        };

        // First match in discovery order wins.
        let mut matches = devices
            .into_iter()
            .filter(|device| device.info().address().matches(address));
        let device = matches.next()?;

        let others: Vec<String> = matches.map(|d| d.identity().to_string()).collect();
        if !others.is_empty() {
            warn!(
                address = %address,
                chosen = %device.identity(),
                ignored = ?others,
                "Ambiguous device address, using first discovered"
            );
        }

        let reported = device.info().address();
        let topic = topic::encode(&self.prefix, &reported);
        self.registry
            .register(&topic, device.identity(), reported)
            .await;
        info!(topic = %topic, device = %device.identity(), "Resolved by discovery");

        Some(device)
    }
}
