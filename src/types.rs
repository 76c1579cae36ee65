//! Common types used throughout the ranked ladder

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform user identifier
pub type UserId = u64;

/// Unique identifier for active matches
pub type MatchId = Uuid;

/// A rating subject: one character played by one user
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId {
    pub user_id: UserId,
    pub character: String,
}

impl ParticipantId {
    pub fn new(user_id: UserId, character: impl Into<String>) -> Self {
        Self {
            user_id,
            character: character.into(),
        }
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.user_id, self.character)
    }
}

/// Discrete standing used by the tiered rating policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStanding {
    pub tier: u32,
    pub points: i32,
}

impl Default for TierStanding {
    fn default() -> Self {
        Self { tier: 1, points: 0 }
    }
}

/// Persisted rating state for one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub participant: ParticipantId,
    pub rating: f64,
    pub rating_deviation: f64,
    pub volatility: f64,
    pub standing: TierStanding,
    pub games_played: u64,
    /// Last time the deviation was brought up to date
    pub last_rated_at: DateTime<Utc>,
}

/// Direction a participant moved between tiers or brackets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BracketChange {
    Promoted,
    Demoted,
    Unchanged,
}

/// Before and after state of one participant for a single result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingDelta {
    pub participant: ParticipantId,
    pub before: RatingRecord,
    pub after: RatingRecord,
    pub bracket_before: String,
    pub bracket_after: String,
    pub bracket_change: BracketChange,
}

impl RatingDelta {
    pub fn rating_change(&self) -> f64 {
        self.after.rating - self.before.rating
    }

    pub fn deviation_change(&self) -> f64 {
        self.after.rating_deviation - self.before.rating_deviation
    }

    pub fn points_change(&self) -> i32 {
        self.after.standing.points - self.before.standing.points
    }
}

/// Result of applying one match outcome to both participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRatingUpdate {
    pub winner: RatingDelta,
    pub loser: RatingDelta,
}

/// Advisory preview of what a match could do to one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeProjection {
    pub participant: ParticipantId,
    pub bracket: String,
    pub rating_if_win: f64,
    pub rating_if_loss: f64,
    pub points_if_win: i32,
    pub points_if_loss: i32,
    pub promotion_possible: bool,
    pub demotion_possible: bool,
}

/// Advisory preview for both sides of a pairing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchProjection {
    pub participant_a: OutcomeProjection,
    pub participant_b: OutcomeProjection,
}

/// A waiting participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub participant: ParticipantId,
    pub rating: RatingRecord,
    pub enqueued_at: DateTime<Utc>,
}

/// Read-only view of a queue entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshotEntry {
    pub position: usize,
    pub participant: ParticipantId,
    pub rating: f64,
    pub rating_deviation: f64,
    pub standing: TierStanding,
    pub bracket: String,
    pub recent_opponents: Vec<UserId>,
    pub enqueued_at: DateTime<Utc>,
}

/// Where a participant landed after joining
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePosition {
    /// 1-based position from the head of the queue
    pub position: usize,
    pub queue_length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchState {
    Open,
    /// A result is being applied; further reports are rejected
    Reporting,
}

/// A pairing waiting for its result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveMatch {
    pub match_id: MatchId,
    pub participant_a: ParticipantId,
    pub participant_b: ParticipantId,
    /// Advisory; absent when the preview could not be computed
    pub projection: Option<MatchProjection>,
    pub state: MatchState,
    pub created_at: DateTime<Utc>,
}

impl ActiveMatch {
    /// Returns (winner, loser) when `user_id` played in this match
    pub fn sides_for_winner(&self, user_id: UserId) -> Option<(&ParticipantId, &ParticipantId)> {
        if self.participant_a.user_id == user_id {
            Some((&self.participant_a, &self.participant_b))
        } else if self.participant_b.user_id == user_id {
            Some((&self.participant_b, &self.participant_a))
        } else {
            None
        }
    }

    pub fn involves_user(&self, user_id: UserId) -> bool {
        self.participant_a.user_id == user_id || self.participant_b.user_id == user_id
    }
}

/// Row appended to the match history after a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchHistoryEntry {
    pub match_id: MatchId,
    pub winner: ParticipantId,
    pub loser: ParticipantId,
    pub winner_rating_before: f64,
    pub winner_rating_after: f64,
    pub loser_rating_before: f64,
    pub loser_rating_after: f64,
    pub reported_at: DateTime<Utc>,
}

/// One row of the leaderboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based rank
    pub rank: usize,
    pub participant: ParticipantId,
    pub rating: f64,
    pub rating_deviation: f64,
    pub standing: TierStanding,
    pub bracket: String,
    pub games_played: u64,
}

/// Win/loss summary for one character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterStats {
    pub record: RatingRecord,
    pub bracket: String,
    pub wins: u64,
    pub losses: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub user_id: UserId,
    pub characters: Vec<CharacterStats>,
}

/// Counters and gauges describing the ladder service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LadderStats {
    pub queue_open: bool,
    pub queue_length: usize,
    pub users_in_match: usize,
    pub active_matches: usize,
    pub max_active_matches: usize,
    pub recent_opponents_limit: usize,
    pub timer_pending: bool,
    pub players_queued: u64,
    pub matches_created: u64,
    pub matches_reported: u64,
    pub matches_cancelled: u64,
    pub passes_run: u64,
}

/// Event emitted when a pairing is created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCreated {
    pub match_id: MatchId,
    pub participant_a: ParticipantId,
    pub participant_b: ParticipantId,
    pub projection: Option<MatchProjection>,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a result has been applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchReported {
    pub match_id: MatchId,
    pub winner: RatingDelta,
    pub loser: RatingDelta,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a match is closed without a result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCancelled {
    pub match_id: MatchId,
    pub participant_a: ParticipantId,
    pub participant_b: ParticipantId,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when the rating period advances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingPeriodClosed {
    pub period_start: DateTime<Utc>,
    pub records_inflated: usize,
    pub timestamp: DateTime<Utc>,
}

/// Union type for all published events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LadderEvent {
    MatchCreated(MatchCreated),
    MatchReported(MatchReported),
    MatchCancelled(MatchCancelled),
    RatingPeriodClosed(RatingPeriodClosed),
}
