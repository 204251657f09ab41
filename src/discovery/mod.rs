//! Device discovery for the bridge.
//!
//! Provides:
//! - `DeviceRegistry`: topic -> last known device cache
//! - `Reconciler`: periodic sweep publishing present and absent devices
//! - `CommandResolver`: topic address -> live device, registry first

use std::time::Duration;

use serde::Deserialize;

pub mod reconciler;
pub mod registry;
pub mod resolver;

pub use reconciler::{Reconciler, SweepReport};
pub use registry::{DeviceRegistry, RegistryEntry};
pub use resolver::CommandResolver;

/// Discovery timing and eviction configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Delay before the first sweep.
    pub initial_delay_secs: u64,
    /// Period between sweeps.
    pub interval_secs: u64,
    /// How long a periodic sweep waits for device responses.
    pub sweep_wait_ms: u64,
    /// How long a resolver fallback sweep waits for device responses.
    pub resolve_wait_ms: u64,
    /// Missed sweeps before a device is dropped from the registry. 0 keeps it forever.
    pub evict_after_missed_sweeps: u32,
}

impl DiscoveryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn sweep_wait(&self) -> Duration {
        Duration::from_millis(self.sweep_wait_ms)
    }

    pub fn resolve_wait(&self) -> Duration {
        Duration::from_millis(self.resolve_wait_ms)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 2,
            interval_secs: 30,
            sweep_wait_ms: 10_000,
            resolve_wait_ms: 3_000,
            evict_after_missed_sweeps: 10,
        }
    }
}
