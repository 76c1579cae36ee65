//! Error types for the ranked ladder
//!
//! Core operations return typed errors so the command layer can match on the
//! kind and report it verbatim. Application plumbing (config, startup, AMQP)
//! uses anyhow through the `Result` alias.

use crate::types::{MatchId, ParticipantId, UserId};

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Application-level failures outside the queue and rating core
#[derive(Debug, thiserror::Error)]
pub enum LadderError {
    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

/// Errors raised by queue operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueueError {
    #[error("The queue is currently closed")]
    QueueClosed,

    #[error("Character is not registered: {participant}")]
    NotRegistered { participant: ParticipantId },

    #[error("Character is already registered: {participant}")]
    AlreadyRegistered { participant: ParticipantId },

    #[error("User {user_id} already has the maximum of {limit} characters")]
    TooManyCharacters { user_id: UserId, limit: usize },

    #[error("Already queued: {participant}")]
    AlreadyQueued { participant: ParticipantId },

    #[error("User {user_id} is already in a match")]
    AlreadyInMatch { user_id: UserId },

    #[error("User {user_id} is not queued")]
    NotQueued { user_id: UserId },

    #[error("Invalid rating override: {reason}")]
    InvalidRating { reason: String },

    #[error("Participant repository unavailable: {message}")]
    RepositoryUnavailable { message: String },
}

/// Errors raised while reporting or cancelling a match
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("Match is not active: {match_id}")]
    UnknownMatch { match_id: MatchId },

    #[error("User {user_id} is not a participant of match {match_id}")]
    NotAParticipant { match_id: MatchId, user_id: UserId },

    #[error("A result for match {match_id} is already being reported")]
    ReportInProgress { match_id: MatchId },

    #[error("Character is not registered: {participant}")]
    NotRegistered { participant: ParticipantId },

    #[error("User {user_id} is in an open match")]
    ParticipantInMatch { user_id: UserId },

    #[error("User {user_id} cannot play against themselves")]
    SameUser { user_id: UserId },

    #[error("Participant repository unavailable: {message}")]
    RepositoryUnavailable { message: String },

    #[error("Rating update failed: {0}")]
    Rating(#[from] RatingError),
}

/// Errors raised by the rating math
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RatingError {
    #[error("Volatility iteration did not converge after {iterations} iterations")]
    NonConvergence { iterations: usize },

    #[error("Invalid rating input: {reason}")]
    InvalidInput { reason: String },
}

/// Errors raised by a participant repository
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    #[error("Repository unavailable: {message}")]
    Unavailable { message: String },

    #[error("Repository call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Record already exists: {participant}")]
    Duplicate { participant: ParticipantId },

    #[error("Record not found: {participant}")]
    NotFound { participant: ParticipantId },
}

impl From<RepositoryError> for QueueError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Duplicate { participant } => QueueError::AlreadyRegistered { participant },
            RepositoryError::NotFound { participant } => QueueError::NotRegistered { participant },
            other => QueueError::RepositoryUnavailable {
                message: other.to_string(),
            },
        }
    }
}

impl From<RepositoryError> for MatchError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { participant } => MatchError::NotRegistered { participant },
            other => MatchError::RepositoryUnavailable {
                message: other.to_string(),
            },
        }
    }
}

impl MatchError {
    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            MatchError::UnknownMatch { .. } => "unknown_match",
            MatchError::NotAParticipant { .. } => "not_a_participant",
            MatchError::ReportInProgress { .. } => "report_in_progress",
            MatchError::NotRegistered { .. } => "not_registered",
            MatchError::ParticipantInMatch { .. } => "participant_in_match",
            MatchError::SameUser { .. } => "same_user",
            MatchError::RepositoryUnavailable { .. } => "repository_unavailable",
            MatchError::Rating(RatingError::NonConvergence { .. }) => "non_convergence",
            MatchError::Rating(RatingError::InvalidInput { .. }) => "invalid_rating",
        }
    }
}

impl QueueError {
    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            QueueError::QueueClosed => "queue_closed",
            QueueError::NotRegistered { .. } => "not_registered",
            QueueError::AlreadyRegistered { .. } => "already_registered",
            QueueError::TooManyCharacters { .. } => "too_many_characters",
            QueueError::AlreadyQueued { .. } => "already_queued",
            QueueError::AlreadyInMatch { .. } => "already_in_match",
            QueueError::NotQueued { .. } => "not_queued",
            QueueError::InvalidRating { .. } => "invalid_rating",
            QueueError::RepositoryUnavailable { .. } => "repository_unavailable",
        }
    }
}
