//! Shared fixtures for bridge integration tests.

use std::sync::Arc;

use lifx_mqtt_bridge::bus::MockBus;
use lifx_mqtt_bridge::device::{DeviceInfo, MockDevice, MockTransport, PowerState};
use lifx_mqtt_bridge::{Bridge, Config};

pub const PREFIX: &str = "lifx";

/// Bridge over an in-memory transport and bus.
pub struct TestBridge {
    pub bridge: Bridge,
    pub transport: Arc<MockTransport>,
    pub bus: Arc<MockBus>,
}

impl TestBridge {
    pub fn new(devices: Vec<Arc<MockDevice>>) -> Self {
        Self::with_config(Config::default(), devices)
    }

    pub fn with_config(config: Config, devices: Vec<Arc<MockDevice>>) -> Self {
        let transport = Arc::new(MockTransport::with_devices(devices));
        Self {
            bridge: Bridge::new(&config, transport.clone()),
            transport,
            bus: Arc::new(MockBus::new()),
        }
    }
}

pub fn bulb(
    n: u8,
    location: &str,
    group: &str,
    label: &str,
    power: PowerState,
) -> Arc<MockDevice> {
    Arc::new(MockDevice::numbered(
        n,
        DeviceInfo::new(location, group, label),
        power,
    ))
}
