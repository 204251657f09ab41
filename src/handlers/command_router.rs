//! Command routing for inbound bus messages.
//!
//! Parses the addressing triple out of the topic, resolves it to a device
//! and dispatches power commands. Every failure ends in a logged drop: no
//! retry, no dead letter, nothing sent back to the bus.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use crate::bus::{InboundMessage, MessageHandler};
use crate::device::PowerState;
use crate::discovery::CommandResolver;
use crate::topic::{self, TopicAddress, SET_POWER};

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Power command sent to the device.
    Dispatched {
        address: TopicAddress,
        power: PowerState,
    },
    /// No device matched the address.
    Unresolved { address: TopicAddress },
    /// Device found, but the command suffix is not supported.
    UnknownCommand { command: String },
    /// Topic too short to carry an address.
    Malformed { topic: String },
}

/// Routes inbound commands to devices.
#[derive(Clone)]
pub struct CommandRouter {
    resolver: Arc<CommandResolver>,
}

impl CommandRouter {
    /// Create a new command router on top of a resolver.
    pub fn new(resolver: Arc<CommandResolver>) -> Self {
        Self { resolver }
    }

    /// Handle one message: resolve, then dispatch.
    ///
    /// The device call is awaited so the outcome is final, but its result is
    /// only logged.
    pub async fn route(&self, message: &InboundMessage) -> RouteOutcome {
        let parsed = match topic::decode_command(&message.topic) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Ignoring malformed topic");
                return RouteOutcome::Malformed {
                    topic: message.topic.clone(),
                };
            }
        };

        debug!(
            topic = %message.topic,
            location = %parsed.address.location,
            group = %parsed.address.group,
            label = %parsed.address.name,
            "Resolving command target"
        );

        let Some(device) = self.resolver.resolve(&parsed.address).await else {
            error!(
                label = %parsed.address.name,
                group = %parsed.address.group,
                location = %parsed.address.location,
                "Could not find device"
            );
            return RouteOutcome::Unresolved {
                address: parsed.address,
            };
        };

        if parsed.command != SET_POWER {
            error!(command = %parsed.command, topic = %message.topic, "Unknown command");
            return RouteOutcome::UnknownCommand {
                command: parsed.command,
            };
        }

        let power = PowerState::from_payload(&message.payload);
        info!(
            topic = %message.topic,
            device = %device.identity(),
            power = %power,
            "Dispatching power command"
        );
        let result = match power {
            PowerState::On => device.turn_on().await,
            PowerState::Off => device.turn_off().await,
        };
        if let Err(e) = result {
            warn!(device = %device.identity(), error = %e, "Power command failed");
        }

        RouteOutcome::Dispatched {
            address: parsed.address,
            power,
        }
    }
}

impl MessageHandler for CommandRouter {
    fn handle(&self, message: InboundMessage) -> BoxFuture<'static, ()> {
        let router = self.clone();
        Box::pin(async move {
            router.route(&message).await;
        })
    }
}
