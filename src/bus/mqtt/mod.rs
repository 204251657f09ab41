//! MQTT message bus implementation using rumqttc.
//!
//! The rumqttc event loop runs in its own task. On every (re)connect the
//! command subscription is renewed and health is reported; each inbound
//! publish is handed to the [`MessageHandler`] in a fresh task so a slow
//! handler never stalls the connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{
    BusError, InboundMessage, MessageBus, MessageHandler, MqttConfig, PublishOptions, QoS, Result,
};
use crate::health::HealthReporter;

/// Capacity of the rumqttc request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Publishing half of the MQTT connection.
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    options: PublishOptions,
}

impl MqttBus {
    /// Connect to the broker and start the event loop.
    ///
    /// `filter` is subscribed on every successful connection; inbound
    /// messages go to `handler`.
    pub fn connect(
        config: &MqttConfig,
        filter: String,
        handler: Arc<dyn MessageHandler>,
        health: Arc<HealthReporter>,
    ) -> Result<(Self, JoinHandle<()>)> {
        let options = config.publish_options()?;
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("lifx-mqtt-bridge-{}", uuid::Uuid::new_v4()));

        let mut mqtt_options = MqttOptions::new(client_id.clone(), &config.host, config.port);
        mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            mqtt_options.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        info!(
            host = %config.host,
            port = config.port,
            client_id = %client_id,
            "MQTT bus initialized"
        );

        let task = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            Subscription {
                filter,
                qos: options.qos,
            },
            handler,
            health,
            Duration::from_secs(config.reconnect_delay_secs),
        ));

        Ok((Self { client, options }, task))
    }

    /// Disconnect from the broker.
    pub async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    /// Queue a publication without waiting for channel space.
    ///
    /// While the broker is unreachable the request channel is not drained;
    /// once it is full, publications fail instead of blocking the caller.
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        debug!(topic = %topic, payload = %payload, "Publishing");
        self.client
            .try_publish(
                topic,
                to_mqtt_qos(self.options.qos),
                self.options.retain,
                payload.as_bytes().to_vec(),
            )
            .map_err(|e| BusError::Publish(e.to_string()))
    }
}

struct Subscription {
    filter: String,
    qos: QoS,
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    subscription: Subscription,
    handler: Arc<dyn MessageHandler>,
    health: Arc<HealthReporter>,
    reconnect_delay: Duration,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connected");
                // try_subscribe: awaiting here would deadlock a full request channel.
                let qos = to_mqtt_qos(subscription.qos);
                match client.try_subscribe(subscription.filter.as_str(), qos) {
                    Ok(()) => info!(filter = %subscription.filter, "Subscribed to commands"),
                    Err(e) => error!(
                        filter = %subscription.filter,
                        error = %e,
                        "Failed to subscribe to commands"
                    ),
                }
                health.healthy();
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage::new(publish.topic, publish.payload);
                debug!(topic = %message.topic, "Inbound message");
                tokio::spawn(handler.handle(message));
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "MQTT connection error");
                health.unhealthy();
                warn!(delay = ?reconnect_delay, "Reconnecting...");
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
}

fn to_mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}
