//! Ranked Ladder - 1v1 matchmaking queue and Glicko-2 rating service
//!
//! This crate provides a matchmaking queue with recent-opponent avoidance,
//! a Glicko-2 rating engine with periodic deviation decay, a legacy tier
//! ladder, and the service plumbing (AMQP events, metrics, health) around them.

pub mod amqp;
pub mod config;
pub mod error;
pub mod matches;
pub mod metrics;
pub mod queue;
pub mod rating;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{LadderError, MatchError, QueueError, RatingError, RepositoryError, Result};
pub use types::*;

// Re-export key components
pub use amqp::publisher::EventPublisher;
pub use rating::{ParticipantRepository, RatingPolicy};
pub use service::MatchmakingService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
