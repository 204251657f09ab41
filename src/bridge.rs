//! Bridge runtime.
//!
//! Owns the shared registry and wires the components around it:
//! - Command resolver and router (inbound commands)
//! - Discovery reconciler (outbound state, periodic)
//! - MQTT bus and health reporting

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bus::{self, MessageBus, MqttBus, MqttConfig};
use crate::config::Config;
use crate::device::DeviceTransport;
use crate::discovery::{CommandResolver, DeviceRegistry, DiscoveryConfig, Reconciler};
use crate::handlers::CommandRouter;
use crate::health::HealthReporter;
use crate::topic;

/// Manages all components of a running bridge.
pub struct Bridge {
    prefix: String,
    mqtt: MqttConfig,
    discovery: DiscoveryConfig,
    transport: Arc<dyn DeviceTransport>,
    /// Topic -> device cache shared by reconciler and resolver.
    registry: Arc<DeviceRegistry>,
    router: CommandRouter,
    health: Arc<HealthReporter>,
    /// Connected bus, once started.
    bus: Option<MqttBus>,
    /// Background task handles.
    tasks: Vec<JoinHandle<()>>,
}

impl Bridge {
    pub fn new(config: &Config, transport: Arc<dyn DeviceTransport>) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let resolver = Arc::new(CommandResolver::new(
            config.topic_prefix.clone(),
            config.discovery.resolve_wait(),
            transport.clone(),
            registry.clone(),
        ));

        Self {
            prefix: config.topic_prefix.clone(),
            mqtt: config.mqtt.clone(),
            discovery: config.discovery.clone(),
            transport,
            registry,
            router: CommandRouter::new(resolver),
            health: Arc::new(HealthReporter::new()),
            bus: None,
            tasks: Vec::new(),
        }
    }

    pub fn registry(&self) -> Arc<DeviceRegistry> {
        self.registry.clone()
    }

    pub fn router(&self) -> CommandRouter {
        self.router.clone()
    }

    pub fn health(&self) -> Arc<HealthReporter> {
        self.health.clone()
    }

    /// Subscription filter for inbound commands.
    pub fn command_filter(&self) -> String {
        topic::command_filter(&self.prefix)
    }

    /// Build a reconciler publishing to `bus`.
    pub fn reconciler(&self, bus: Arc<dyn MessageBus>) -> Reconciler {
        Reconciler::new(
            self.prefix.clone(),
            self.discovery.clone(),
            self.transport.clone(),
            self.registry.clone(),
            bus,
        )
    }

    /// Run the reconciler in the background, publishing to `bus`.
    pub fn spawn_reconciler(&mut self, bus: Arc<dyn MessageBus>) {
        let reconciler = self.reconciler(bus);
        self.tasks.push(tokio::spawn(async move { reconciler.run().await }));
    }

    /// Connect to the broker and start the reconciler.
    pub fn start(&mut self) -> bus::Result<()> {
        let (mqtt, event_loop) = MqttBus::connect(
            &self.mqtt,
            self.command_filter(),
            Arc::new(self.router.clone()),
            self.health.clone(),
        )?;
        self.tasks.push(event_loop);
        self.spawn_reconciler(Arc::new(mqtt.clone()));
        self.bus = Some(mqtt);

        info!(prefix = %self.prefix, "Bridge started");
        Ok(())
    }

    /// Run the bridge until Ctrl+C.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.start()?;

        info!("Bridge running, press Ctrl+C to exit");
        tokio::signal::ctrl_c().await?;

        info!("Shutting down bridge");
        self.shutdown().await;
        Ok(())
    }

    /// Stop background tasks and disconnect from the broker.
    pub async fn shutdown(self) {
        if let Some(bus) = &self.bus {
            if let Err(e) = bus.disconnect().await {
                warn!(error = %e, "MQTT disconnect failed");
            }
        }
        for task in self.tasks {
            task.abort();
        }
    }
}
