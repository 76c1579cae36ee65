//! AMQP integration for the ranked ladder
//!
//! This module handles the broker connection and outbound event publishing.
//! Commands arrive through the service API; the broker only carries events.

pub mod connection;
pub mod messages;
pub mod publisher;

// Re-export commonly used types
pub use connection::{AmqpConfig, AmqpConnection};
pub use messages::*;
pub use publisher::{
    AmqpEventPublisher, EventPublisher, LoggingEventPublisher, PublisherConfig,
    RecordingEventPublisher,
};
