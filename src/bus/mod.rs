//! Message bus for device state and commands.
//!
//! This module contains:
//! - `MessageBus` trait: Publication of device state
//! - `MessageHandler` trait: For processing inbound command messages
//! - Bus configuration types
//! - Implementations: MQTT (rumqttc), Mock

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::Deserialize;

pub mod mock;
pub mod mqtt;

pub use mock::MockBus;
pub use mqtt::MqttBus;

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Invalid QoS level {0}, expected 0, 1 or 2")]
    InvalidQos(u8),
}

/// Delivery guarantee for a publication or subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QoS {
    type Error = BusError;

    fn try_from(level: u8) -> Result<Self> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(BusError::InvalidQos(other)),
        }
    }
}

/// Options applied uniformly to every outbound publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    pub qos: QoS,
    pub retain: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            qos: QoS::AtLeastOnce,
            retain: true,
        }
    }
}

/// A message received from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Handler for processing messages from the bus.
pub trait MessageHandler: Send + Sync {
    /// Process one inbound message.
    fn handle(&self, message: InboundMessage) -> BoxFuture<'static, ()>;
}

/// Interface for outbound publication.
///
/// Implementations:
/// - `MqttBus`: MQTT broker via rumqttc
/// - `MockBus`: In-memory mock for testing
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `payload` to `topic` with the bus-wide options.
    async fn publish(&self, topic: &str, payload: &str) -> Result<()>;
}

// ============================================================================
// Configuration
// ============================================================================

/// MQTT connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host name or address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Client id; generated when unset.
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// QoS level (0, 1 or 2) for publications and the command subscription.
    pub qos: u8,
    /// Retain flag for state publications.
    pub retain: bool,
    pub keep_alive_secs: u64,
    /// Pause after a connection error before polling again.
    pub reconnect_delay_secs: u64,
}

impl MqttConfig {
    pub fn publish_options(&self) -> Result<PublishOptions> {
        Ok(PublishOptions {
            qos: QoS::try_from(self.qos)?,
            retain: self.retain,
        })
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: None,
            username: None,
            password: None,
            qos: 1,
            retain: true,
            keep_alive_secs: 30,
            reconnect_delay_secs: 5,
        }
    }
}
