//! Mock device transport for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    Device, DeviceIdentity, DeviceInfo, DeviceTransport, MacAddr, PowerState, Result,
    TransportError,
};

/// In-memory device that records every power command.
pub struct MockDevice {
    identity: DeviceIdentity,
    info: DeviceInfo,
    power: Mutex<PowerState>,
    commands: Mutex<Vec<PowerState>>,
    fail_get_power: AtomicBool,
}

impl MockDevice {
    pub fn new(identity: DeviceIdentity, info: DeviceInfo, power: PowerState) -> Self {
        Self {
            identity,
            info,
            power: Mutex::new(power),
            commands: Mutex::new(Vec::new()),
            fail_get_power: AtomicBool::new(false),
        }
    }

    /// Convenience constructor with a synthetic identity derived from `n`.
    pub fn numbered(n: u8, info: DeviceInfo, power: PowerState) -> Self {
        let identity = DeviceIdentity {
            address: ([192, 168, 1, n], 56700).into(),
            mac: MacAddr([0xd0, 0x73, 0xd5, 0, 0, n]),
        };
        Self::new(identity, info, power)
    }

    pub fn set_fail_get_power(&self, fail: bool) {
        self.fail_get_power.store(fail, Ordering::SeqCst);
    }

    /// Power commands received so far, in order.
    pub fn commands(&self) -> Vec<PowerState> {
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn power(&self) -> PowerState {
        *self.power.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Device for MockDevice {
    fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    async fn get_power(&self) -> Result<PowerState> {
        if self.fail_get_power.load(Ordering::SeqCst) {
            return Err(TransportError::Timeout {
                address: self.identity.address,
                attempts: 1,
            });
        }
        Ok(self.power())
    }

    async fn set_power(&self, state: PowerState) -> Result<()> {
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(state);
        *self.power.lock().unwrap_or_else(|e| e.into_inner()) = state;
        Ok(())
    }
}

/// Mock transport returning a configurable set of devices from each sweep.
#[derive(Default)]
pub struct MockTransport {
    devices: Mutex<Vec<Arc<MockDevice>>>,
    fail_on_discover: AtomicBool,
    discover_count: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: Vec<Arc<MockDevice>>) -> Self {
        let transport = Self::new();
        transport.set_devices(devices);
        transport
    }

    /// Replace the devices visible to the next sweep.
    pub fn set_devices(&self, devices: Vec<Arc<MockDevice>>) {
        *self.devices.lock().unwrap_or_else(|e| e.into_inner()) = devices;
    }

    pub fn set_fail_on_discover(&self, fail: bool) {
        self.fail_on_discover.store(fail, Ordering::SeqCst);
    }

    pub fn discover_count(&self) -> usize {
        self.discover_count.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Vec<Arc<MockDevice>> {
        self.devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl DeviceTransport for MockTransport {
    async fn discover(&self, _wait: Duration) -> Result<Vec<Arc<dyn Device>>> {
        self.discover_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_discover.load(Ordering::SeqCst) {
            return Err(TransportError::Discovery("Mock discovery failure".to_string()));
        }
        Ok(self
            .snapshot()
            .into_iter()
            .map(|d| d as Arc<dyn Device>)
            .collect())
    }

    fn create_device(&self, identity: DeviceIdentity, info: DeviceInfo) -> Result<Arc<dyn Device>> {
        // Hand back the live mock when known so tests can observe commands.
        if let Some(device) = self
            .snapshot()
            .into_iter()
            .find(|d| d.identity() == identity)
        {
            return Ok(device as Arc<dyn Device>);
        }
        Ok(Arc::new(MockDevice::new(identity, info, PowerState::Off)) as Arc<dyn Device>)
    }
}
