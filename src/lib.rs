//! LIFX MQTT Bridge
//!
//! Publishes the power state of LIFX bulbs on the local network to an MQTT
//! broker and turns bulbs on or off from `{prefix}/{location}/{group}/{name}/setPower`
//! commands.

pub mod bridge;
pub mod bus;
pub mod config;
pub mod device;
pub mod discovery;
pub mod handlers;
pub mod health;
pub mod topic;
pub mod utils;

pub use bridge::Bridge;
pub use config::Config;
