//! Device abstraction.
//!
//! This module contains:
//! - `Device` trait: power query/control of one light
//! - `DeviceTransport` trait: network discovery and device handle creation
//! - Identity and state types shared by the registry, reconciler and router
//! - Implementations: LIFX LAN (UDP), Mock

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::topic::TopicAddress;

pub mod lifx;
pub mod mock;

pub use lifx::{LifxConfig, LifxTransport};
pub use mock::{MockDevice, MockTransport};

/// Placeholder segment for metadata a device did not report.
pub const UNKNOWN_SEGMENT: &str = "unknown";

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur talking to devices.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request to {address} timed out after {attempts} attempts")]
    Timeout { address: SocketAddr, attempts: u32 },

    #[error("Malformed packet: {0}")]
    Malformed(String),

    #[error("Unexpected response type {actual}, expected {expected}")]
    UnexpectedResponse { expected: u16, actual: u16 },

    #[error("Discovery failed: {0}")]
    Discovery(String),
}

/// Hardware identifier of a device (its MAC address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Network identity of a device: where it lives and what it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub address: SocketAddr,
    pub mac: MacAddr,
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.mac, self.address)
    }
}

/// Descriptive metadata reported by discovery. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub label: Option<String>,
    pub group: Option<String>,
    pub location: Option<String>,
}

impl DeviceInfo {
    pub fn new(
        location: impl Into<String>,
        group: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            label: Some(label.into()),
            group: Some(group.into()),
            location: Some(location.into()),
        }
    }

    /// Addressing triple for this device.
    ///
    /// Missing fields become [`UNKNOWN_SEGMENT`], producing a degenerate but
    /// usable topic.
    pub fn address(&self) -> TopicAddress {
        let segment = |field: &Option<String>| {
            field
                .clone()
                .unwrap_or_else(|| UNKNOWN_SEGMENT.to_string())
        };
        TopicAddress::new(
            segment(&self.location),
            segment(&self.group),
            segment(&self.label),
        )
    }

    pub fn is_complete(&self) -> bool {
        self.label.is_some() && self.group.is_some() && self.location.is_some()
    }
}

/// Binary power state. Wire format is `"1"` (on) / `"0"` (off).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    /// Map an inbound command payload: `"1"` is on, anything else is off.
    pub fn from_payload(payload: &[u8]) -> Self {
        if payload == b"1" {
            PowerState::On
        } else {
            PowerState::Off
        }
    }

    pub fn as_payload(&self) -> &'static str {
        match self {
            PowerState::On => "1",
            PowerState::Off => "0",
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, PowerState::On)
    }
}

impl From<bool> for PowerState {
    fn from(on: bool) -> Self {
        if on {
            PowerState::On
        } else {
            PowerState::Off
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_payload())
    }
}

/// A single controllable light.
#[async_trait]
pub trait Device: Send + Sync {
    fn identity(&self) -> DeviceIdentity;

    fn info(&self) -> &DeviceInfo;

    /// Query the current power state.
    async fn get_power(&self) -> Result<PowerState>;

    /// Switch the device on or off.
    async fn set_power(&self, state: PowerState) -> Result<()>;

    async fn turn_on(&self) -> Result<()> {
        self.set_power(PowerState::On).await
    }

    async fn turn_off(&self) -> Result<()> {
        self.set_power(PowerState::Off).await
    }
}

/// Interface to the device network.
///
/// Implementations:
/// - `LifxTransport`: LIFX LAN protocol over UDP
/// - `MockTransport`: In-memory mock for testing
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Sweep the network, waiting up to `wait` for responses.
    ///
    /// Devices are returned in the order the transport saw them.
    async fn discover(&self, wait: Duration) -> Result<Vec<Arc<dyn Device>>>;

    /// Build a handle for a previously seen device without touching the network.
    fn create_device(&self, identity: DeviceIdentity, info: DeviceInfo) -> Result<Arc<dyn Device>>;
}
