//! Health signalling.
//!
//! The bridge is healthy while its bus connection is up. Transitions are
//! published on a watch channel; [`log_transitions`] is the consumer the
//! binary runs.

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Current health of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Starting,
    Healthy,
    Unhealthy,
}

/// Reports and broadcasts health transitions.
pub struct HealthReporter {
    sender: watch::Sender<HealthStatus>,
}

impl HealthReporter {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(HealthStatus::Starting);
        Self { sender }
    }

    pub fn healthy(&self) {
        self.transition(HealthStatus::Healthy);
    }

    pub fn unhealthy(&self) {
        self.transition(HealthStatus::Unhealthy);
    }

    pub fn status(&self) -> HealthStatus {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.sender.subscribe()
    }

    fn transition(&self, status: HealthStatus) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        })
    }
}

/// Log every health transition until the reporter is dropped.
pub async fn log_transitions(mut receiver: watch::Receiver<HealthStatus>) {
    while receiver.changed().await.is_ok() {
        let status = *receiver.borrow_and_update();
        match status {
            HealthStatus::Healthy => info!("Bridge healthy"),
            HealthStatus::Unhealthy => error!("Bridge unhealthy"),
            HealthStatus::Starting => debug!("Bridge starting"),
        }
    }
    warn!("Health reporter closed");
}

impl Default for HealthReporter {
    fn default() -> Self {
        Self::new()
    }
}
