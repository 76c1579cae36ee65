//! Rating engine
//!
//! This module provides the Glicko-2 math, the legacy tier ladder, bracket
//! naming and the participant repository interface.

pub mod brackets;
pub mod calculator;
pub mod glicko2;
pub mod storage;
pub mod tiered;

use crate::config::{RatingPolicyKind, RatingSettings};
use std::sync::Arc;

// Re-export commonly used types
pub use brackets::BracketTable;
pub use calculator::{rating_delta, RatingPolicy};
pub use glicko2::{Glicko2Parameters, Glicko2Policy, Glicko2Rating, GameOutcome};
pub use storage::{bounded, InMemoryParticipantRepository, ParticipantRepository};
pub use tiered::TieredPolicy;

/// Build the configured rating policy
pub fn build_policy(settings: &RatingSettings) -> Arc<dyn RatingPolicy> {
    match settings.policy {
        RatingPolicyKind::Glicko2 => Arc::new(Glicko2Policy::new(
            settings.glicko.clone(),
            BracketTable::new(settings.brackets.clone()),
            settings.rating_period(),
        )),
        RatingPolicyKind::Tiered => Arc::new(TieredPolicy::new(settings.tiers.clone())),
    }
}
