//! AMQP integration for the matchmaking service
//!
//! This module handles the AMQP connection, inbound command consumption and
//! publishing of match events and command replies.

pub mod connection;
pub mod handlers;
pub mod messages;
pub mod publisher;

// Re-export commonly used types
pub use connection::{AmqpConfig, AmqpConnection};
pub use handlers::{CommandConsumer, MessageHandler};
pub use messages::*;
pub use publisher::{AmqpEventPublisher, EventPublisher, MockEventPublisher, PublisherConfig};
