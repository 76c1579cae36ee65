//! Queue and matchmaking configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Matchmaking-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Whether the queue accepts joins at startup
    pub queue_open: bool,
    /// Upper bound on simultaneously open matches
    pub max_active_matches: usize,
    /// Opponents remembered per participant to veto rematches
    pub recent_opponents_limit: usize,
    /// Delay between an enqueue and the matchmaking pass it triggers
    pub matchmaking_delay_ms: u64,
    /// Put both participants back in the queue after a report
    pub requeue_after_report: bool,
    pub max_characters_per_user: usize,
    /// Timeout applied to every repository call
    pub repository_timeout_ms: u64,
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            queue_open: true,
            max_active_matches: 3,
            recent_opponents_limit: 2,
            matchmaking_delay_ms: 30_000, // 30 seconds
            requeue_after_report: false,
            max_characters_per_user: 3,
            repository_timeout_ms: 5_000,
        }
    }
}

impl MatchmakingSettings {
    /// Get matchmaking delay as Duration
    pub fn matchmaking_delay(&self) -> Duration {
        Duration::from_millis(self.matchmaking_delay_ms)
    }

    /// Get repository timeout as Duration
    pub fn repository_timeout(&self) -> Duration {
        Duration::from_millis(self.repository_timeout_ms)
    }
}
