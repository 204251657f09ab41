//! lifx-mqtt-bridge: MQTT front end for LIFX bulbs
//!
//! Publishes `1`/`0` to `{prefix}/{location}/{group}/{name}` for every bulb
//! found on the LAN and applies `{prefix}/{location}/{group}/{name}/setPower`
//! commands.
//!
//! ## Configuration
//! ```yaml
//! topic_prefix: lifx
//! mqtt:
//!   host: broker.lan
//!   port: 1883
//! discovery:
//!   interval_secs: 30
//! ```
//!
//! An optional path to a YAML file may be passed as the first argument.

use std::sync::Arc;

use tracing::info;

use lifx_mqtt_bridge::device::LifxTransport;
use lifx_mqtt_bridge::health::log_transitions;
use lifx_mqtt_bridge::utils::bootstrap::init_tracing;
use lifx_mqtt_bridge::{Bridge, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = std::env::args().nth(1);
    let config = Config::load(path.as_deref())?;
    config.validate()?;

    info!(
        prefix = %config.topic_prefix,
        broker = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
        "lifx-mqtt-bridge starting"
    );

    let transport = Arc::new(LifxTransport::new(config.lifx.clone()));
    let bridge = Bridge::new(&config, transport);
    tokio::spawn(log_transitions(bridge.health().subscribe()));
    bridge.run().await
}
