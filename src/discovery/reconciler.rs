//! Discovery reconciler.
//!
//! Periodically sweeps the network, refreshes the registry from what it
//! finds, publishes the power state of every discovered device and publishes
//! "off" for every known topic the sweep did not see.
//!
//! ## Sweep
//!
//! 1. Snapshot registered topics as the expected set
//! 2. Discover; on failure log and stop without touching state
//! 3. For each device: query power, register, publish state
//! 4. For each expected topic not seen: publish "0", count the miss, evict
//!    once the miss limit is reached

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{DeviceRegistry, DiscoveryConfig};
use crate::bus::MessageBus;
use crate::device::{Device, DeviceTransport, PowerState, Result};
use crate::topic::{self, TopicKey};

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Devices returned by discovery.
    pub discovered: usize,
    /// State published per discovered topic; `None` when the power query failed.
    pub states: Vec<(String, Option<PowerState>)>,
    /// Previously known topics not seen this sweep, published as off.
    pub missing: Vec<String>,
    /// Topics removed from the registry this sweep.
    pub evicted: Vec<String>,
}

/// Periodic discovery sweep.
pub struct Reconciler {
    prefix: String,
    config: DiscoveryConfig,
    transport: Arc<dyn DeviceTransport>,
    registry: Arc<DeviceRegistry>,
    bus: Arc<dyn MessageBus>,
}

impl Reconciler {
    pub fn new(
        prefix: impl Into<String>,
        config: DiscoveryConfig,
        transport: Arc<dyn DeviceTransport>,
        registry: Arc<DeviceRegistry>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            config,
            transport,
            registry,
            bus,
        }
    }

    /// Run sweeps forever: first after `initial_delay`, then every `interval`.
    ///
    /// A failed sweep is logged; the next tick is an independent attempt.
    pub async fn run(&self) {
        info!(
            initial_delay = ?self.config.initial_delay(),
            interval = ?self.config.interval(),
            "Starting discovery reconciler"
        );

        let start = Instant::now() + self.config.initial_delay();
        let mut ticker = interval_at(start, self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.sweep().await {
                Ok(report) => {
                    info!(
                        discovered = report.discovered,
                        missing = report.missing.len(),
                        evicted = report.evicted.len(),
                        "Done discovery/poll"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Discovery sweep failed");
                }
            }
        }
    }

    /// Perform one sweep.
    ///
    /// Returns an error only when discovery itself fails, in which case the
    /// registry is left untouched and nothing is published.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let mut expected: HashMap<TopicKey, String> = self
            .registry
            .topics()
            .await
            .into_iter()
            .map(|t| (TopicKey::new(&t), t))
            .collect();
        debug!(expected = ?expected.values().collect::<Vec<_>>(), "Starting sweep");

        let devices = self.transport.discover(self.config.sweep_wait()).await?;

        let mut report = SweepReport {
            discovered: devices.len(),
            ..SweepReport::default()
        };

        let mut seen = Vec::with_capacity(devices.len());
        for device in devices {
            let topic = topic::encode(&self.prefix, &device.info().address());
            expected.remove(&TopicKey::new(&topic));
            seen.push((topic, device));
        }

        report.states = join_all(
            seen.into_iter()
                .map(|(topic, device)| self.refresh_device(topic, device)),
        )
        .await;

        let mut missing: Vec<String> = expected.into_values().collect();
        missing.sort();
        for topic in &missing {
            if let Some(evicted) = self.mark_missing(topic).await {
                report.evicted.push(evicted);
            }
        }
        report.missing = missing;

        Ok(report)
    }

    /// Query, register and publish one discovered device.
    async fn refresh_device(
        &self,
        topic: String,
        device: Arc<dyn Device>,
    ) -> (String, Option<PowerState>) {
        let identity = device.identity();
        let address = device.info().address();

        let power = match device.get_power().await {
            Ok(power) => Some(power),
            Err(e) => {
                warn!(topic = %topic, device = %identity, error = %e, "Failed to query power");
                None
            }
        };

        self.registry.register(&topic, identity, address).await;

        if let Some(power) = power {
            info!(topic = %topic, power = %power, "Device state");
            self.publish(&topic, power).await;
        }

        (topic, power)
    }

    /// Publish off for a topic the sweep did not see. Returns the topic if
    /// it was evicted.
    async fn mark_missing(&self, topic: &str) -> Option<String> {
        info!(topic = %topic, "Device not seen, publishing off");
        self.publish(topic, PowerState::Off).await;

        let misses = self.registry.record_miss(topic).await?;
        let limit = self.config.evict_after_missed_sweeps;
        if limit > 0 && misses >= limit {
            self.registry.evict(topic).await;
            return Some(topic.to_string());
        }
        None
    }

    async fn publish(&self, topic: &str, power: PowerState) {
        if let Err(e) = self.bus.publish(topic, power.as_payload()).await {
            error!(topic = %topic, error = %e, "Failed to publish device state");
        }
    }
}
