//! AMQP integration for the lobby bot
//!
//! Inbound platform events arrive on a queue fed by the platform gateway;
//! outbound respond and edit calls are published to the gateway as
//! request/reply messages.

pub mod client;
pub mod connection;
pub mod handlers;
pub mod messages;

// Re-export commonly used types
pub use client::AmqpPlatformClient;
pub use connection::{AmqpConfig, AmqpConnection};
pub use handlers::{EventHandler, InteractionConsumer};
pub use messages::*;
