//! LIFX LAN transport.
//!
//! Talks to bulbs directly over UDP port 56700. Discovery broadcasts a
//! GetService packet and collects StateService replies, then reads each
//! bulb's label, group and location.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde::Deserialize;

mod client;
pub mod protocol;

pub use client::{LifxDevice, LifxTransport};

/// Default LIFX LAN port.
pub const DEFAULT_PORT: u16 = 56700;

/// LIFX transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LifxConfig {
    /// Address discovery packets are broadcast to.
    pub broadcast_address: Ipv4Addr,
    /// UDP port bulbs listen on.
    pub port: u16,
    /// How long a unicast request waits for its reply.
    pub request_timeout_ms: u64,
    /// Attempts per unicast request before giving up.
    pub retries: u32,
}

impl LifxConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for LifxConfig {
    fn default() -> Self {
        Self {
            broadcast_address: Ipv4Addr::BROADCAST,
            port: DEFAULT_PORT,
            request_timeout_ms: 1000,
            retries: 3,
        }
    }
}
