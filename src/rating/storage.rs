//! Participant repository interface and implementations
//!
//! The repository is the only persistent state the ladder touches: rating
//! records, the match history and the global rating-period start. Calls are
//! async so a database-backed implementation can sit behind the same trait;
//! callers bound every call with a timeout.

use crate::error::RepositoryError;
use crate::types::{MatchHistoryEntry, ParticipantId, RatingRecord, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;
use std::time::Duration;

/// Trait for participant persistence
#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    /// Get a participant's rating record
    async fn get_rating(
        &self,
        participant: &ParticipantId,
    ) -> Result<Option<RatingRecord>, RepositoryError>;

    /// Store or update a participant's rating record
    async fn put_rating(&self, record: RatingRecord) -> Result<(), RepositoryError>;

    /// Create a record, failing if one already exists
    async fn insert_rating(&self, record: RatingRecord) -> Result<(), RepositoryError>;

    /// Remove a participant's record; returns whether it existed
    async fn remove_rating(&self, participant: &ParticipantId) -> Result<bool, RepositoryError>;

    async fn append_match_history(&self, entry: MatchHistoryEntry) -> Result<(), RepositoryError>;

    /// Delete the most recent history row between two users, in either
    /// winner/loser order. Ratings are not touched.
    async fn remove_last_match(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Option<MatchHistoryEntry>, RepositoryError>;

    /// All registered participants
    async fn list_active_characters(&self) -> Result<Vec<RatingRecord>, RepositoryError>;

    /// Match history, optionally restricted to one user, oldest first
    async fn list_match_history(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<MatchHistoryEntry>, RepositoryError>;

    async fn get_rating_period_start(&self) -> Result<Option<DateTime<Utc>>, RepositoryError>;

    async fn set_rating_period_start(&self, start: DateTime<Utc>) -> Result<(), RepositoryError>;

    /// Persist both new records and the history row for one result.
    /// Transactional stores should override this to commit atomically.
    async fn commit_match_result(
        &self,
        winner: RatingRecord,
        loser: RatingRecord,
        history: MatchHistoryEntry,
    ) -> Result<(), RepositoryError> {
        self.put_rating(winner).await?;
        self.put_rating(loser).await?;
        self.append_match_history(history).await
    }

    /// Replace `expected` with `record` only if the stored record still equals
    /// `expected`. Returns whether the write happened. Stores with
    /// conditional writes should override this to make it atomic.
    async fn put_rating_if_unchanged(
        &self,
        expected: &RatingRecord,
        record: RatingRecord,
    ) -> Result<bool, RepositoryError> {
        match self.get_rating(&expected.participant).await? {
            Some(current) if &current == expected => {
                self.put_rating(record).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Registered characters for one user
    async fn characters_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<RatingRecord>, RepositoryError> {
        Ok(self
            .list_active_characters()
            .await?
            .into_iter()
            .filter(|record| record.participant.user_id == user_id)
            .collect())
    }
}

/// Run a repository call with an upper bound on its duration
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, RepositoryError>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RepositoryError::Timeout {
            after_ms: limit.as_millis() as u64,
        }),
    }
}

#[derive(Debug, Default)]
struct RepositoryState {
    ratings: HashMap<ParticipantId, RatingRecord>,
    history: Vec<MatchHistoryEntry>,
    rating_period_start: Option<DateTime<Utc>>,
}

/// In-memory repository implementation
#[derive(Debug, Default)]
pub struct InMemoryParticipantRepository {
    state: RwLock<RepositoryState>,
}

impl InMemoryParticipantRepository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository seeded with records
    pub fn with_records(records: impl IntoIterator<Item = RatingRecord>) -> Self {
        let repository = Self::new();
        if let Ok(mut state) = repository.state.write() {
            for record in records {
                state.ratings.insert(record.participant.clone(), record);
            }
        }
        repository
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, RepositoryState>, RepositoryError> {
        self.state.read().map_err(|_| RepositoryError::Unavailable {
            message: "Failed to acquire repository read lock".to_string(),
        })
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, RepositoryState>, RepositoryError> {
        self.state.write().map_err(|_| RepositoryError::Unavailable {
            message: "Failed to acquire repository write lock".to_string(),
        })
    }
}

#[async_trait]
impl ParticipantRepository for InMemoryParticipantRepository {
    async fn get_rating(
        &self,
        participant: &ParticipantId,
    ) -> Result<Option<RatingRecord>, RepositoryError> {
        Ok(self.read()?.ratings.get(participant).cloned())
    }

    async fn put_rating(&self, record: RatingRecord) -> Result<(), RepositoryError> {
        let mut state = self.write()?;
        if !state.ratings.contains_key(&record.participant) {
            return Err(RepositoryError::NotFound {
                participant: record.participant,
            });
        }
        state.ratings.insert(record.participant.clone(), record);
        Ok(())
    }

    async fn insert_rating(&self, record: RatingRecord) -> Result<(), RepositoryError> {
        let mut state = self.write()?;
        if state.ratings.contains_key(&record.participant) {
            return Err(RepositoryError::Duplicate {
                participant: record.participant,
            });
        }
        state.ratings.insert(record.participant.clone(), record);
        Ok(())
    }

    async fn remove_rating(&self, participant: &ParticipantId) -> Result<bool, RepositoryError> {
        Ok(self.write()?.ratings.remove(participant).is_some())
    }

    async fn append_match_history(&self, entry: MatchHistoryEntry) -> Result<(), RepositoryError> {
        self.write()?.history.push(entry);
        Ok(())
    }

    async fn remove_last_match(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Option<MatchHistoryEntry>, RepositoryError> {
        let mut state = self.write()?;
        let latest = state.history.iter().rposition(|entry| {
            let (winner, loser) = (entry.winner.user_id, entry.loser.user_id);
            (winner == user_a && loser == user_b) || (winner == user_b && loser == user_a)
        });
        Ok(latest.map(|index| state.history.remove(index)))
    }

    async fn list_active_characters(&self) -> Result<Vec<RatingRecord>, RepositoryError> {
        let mut records: Vec<RatingRecord> = self.read()?.ratings.values().cloned().collect();
        records.sort_by(|a, b| a.participant.cmp(&b.participant));
        Ok(records)
    }

    async fn list_match_history(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<MatchHistoryEntry>, RepositoryError> {
        let state = self.read()?;
        Ok(state
            .history
            .iter()
            .filter(|entry| match user_id {
                Some(user) => entry.winner.user_id == user || entry.loser.user_id == user,
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn get_rating_period_start(&self) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        Ok(self.read()?.rating_period_start)
    }

    async fn set_rating_period_start(&self, start: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.write()?.rating_period_start = Some(start);
        Ok(())
    }

    async fn put_rating_if_unchanged(
        &self,
        expected: &RatingRecord,
        record: RatingRecord,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.write()?;
        match state.ratings.get(&expected.participant) {
            Some(current) if current == expected => {
                state.ratings.insert(record.participant.clone(), record);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit_match_result(
        &self,
        winner: RatingRecord,
        loser: RatingRecord,
        history: MatchHistoryEntry,
    ) -> Result<(), RepositoryError> {
        let mut state = self.write()?;
        for record in [&winner, &loser] {
            if !state.ratings.contains_key(&record.participant) {
                return Err(RepositoryError::NotFound {
                    participant: record.participant.clone(),
                });
            }
        }
        state.ratings.insert(winner.participant.clone(), winner);
        state.ratings.insert(loser.participant.clone(), loser);
        state.history.push(history);
        Ok(())
    }
}
