//! Configuration management for the ranked ladder service
//!
//! This module handles configuration loading from TOML files and environment
//! variables, validation, and default values.

pub mod app;
pub mod matchmaking;
pub mod rating;

// Re-export commonly used types
pub use app::{validate_config, AmqpSettings, AppConfig, ServiceSettings};
pub use matchmaking::MatchmakingSettings;
pub use rating::{
    BracketThreshold, Glicko2Settings, RatingPolicyKind, RatingSettings, TierSettings,
};
