//! Device registry - thread-safe cache of the last known device per topic.

use std::collections::{BTreeSet, HashMap};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::device::DeviceIdentity;
use crate::topic::{TopicAddress, TopicKey};

/// A cached device behind a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Topic as published, original casing.
    pub topic: String,
    pub identity: DeviceIdentity,
    pub address: TopicAddress,
    /// Consecutive sweeps that did not see this device.
    pub missed_sweeps: u32,
}

/// Thread-safe device registry.
///
/// Maintains a map of topic -> last known device. Keys are case-folded, so
/// lookups ignore case. Writers never conflict: the last `register` for a
/// topic wins.
pub struct DeviceRegistry {
    entries: RwLock<HashMap<TopicKey, RegistryEntry>>,
}

impl DeviceRegistry {
    /// Create a new empty device registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or overwrite the entry for `topic`, clearing its miss count.
    pub async fn register(&self, topic: &str, identity: DeviceIdentity, address: TopicAddress) {
        let mut entries = self.entries.write().await;
        let previous = entries.insert(
            TopicKey::new(topic),
            RegistryEntry {
                topic: topic.to_string(),
                identity,
                address,
                missed_sweeps: 0,
            },
        );

        match previous {
            Some(old) if old.identity != identity => {
                info!(
                    topic = %topic,
                    old = %old.identity,
                    new = %identity,
                    "Device behind topic changed"
                );
            }
            Some(_) => {}
            None => {
                info!(topic = %topic, device = %identity, "Registering device");
            }
        }
    }

    /// Get the entry for a topic, ignoring case.
    pub async fn lookup(&self, topic: &str) -> Option<RegistryEntry> {
        let entries = self.entries.read().await;
        let entry = entries.get(&TopicKey::new(topic)).cloned();
        debug!(topic = %topic, found = entry.is_some(), "Registry lookup");
        entry
    }

    /// Every registered topic, in publication casing.
    pub async fn topics(&self) -> BTreeSet<String> {
        let entries = self.entries.read().await;
        entries.values().map(|e| e.topic.clone()).collect()
    }

    /// Count a sweep that did not see `topic`. Returns the new miss count,
    /// or `None` if the topic is not registered.
    pub async fn record_miss(&self, topic: &str) -> Option<u32> {
        let mut entries = self.entries.write().await;
        entries.get_mut(&TopicKey::new(topic)).map(|entry| {
            entry.missed_sweeps += 1;
            entry.missed_sweeps
        })
    }

    /// Remove the entry for a topic.
    pub async fn evict(&self, topic: &str) -> Option<RegistryEntry> {
        info!(topic = %topic, "Evicting device");
        let mut entries = self.entries.write().await;
        entries.remove(&TopicKey::new(topic))
    }

    /// Get the number of registered topics.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }

    /// Check if the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
