//! Service layer for the ranked ladder
//!
//! This module contains the matchmaking service, the retry timer and rating
//! period clock it relies on, health checks and the application state that
//! wires everything together.

pub mod app;
pub mod health;
pub mod matchmaking;
pub mod rating_period;
pub mod timer;

pub use app::{AppState, ServiceError};
pub use health::{HealthCheck, HealthStatus, ServiceHandle};
pub use matchmaking::MatchmakingService;
pub use rating_period::RatingPeriodClock;
pub use timer::RetryTimer;
