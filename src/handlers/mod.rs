//! Inbound message handlers.

pub mod command_router;

pub use command_router::{CommandRouter, RouteOutcome};
