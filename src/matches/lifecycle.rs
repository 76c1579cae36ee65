//! Active match tracking and result reporting
//!
//! Matches live in their own map, separate from the queue lock, so reports for
//! different matches run in parallel. A report first claims its match (state
//! `Reporting`); the claim is released again if anything after it fails, so a
//! failed report leaves the match open for a retry.

use crate::error::{MatchError, RepositoryError};
use crate::metrics::MetricsCollector;
use crate::rating::{bounded, ParticipantRepository, RatingPolicy};
use crate::types::{
    ActiveMatch, MatchHistoryEntry, MatchId, MatchRatingUpdate, MatchState, ParticipantId,
    QueueEntry, RatingRecord, UserId,
};
use crate::utils::{current_timestamp, generate_match_id};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Owner of every open match
pub struct MatchLifecycle {
    matches: RwLock<HashMap<MatchId, ActiveMatch>>,
    policy: Arc<dyn RatingPolicy>,
    repository: Arc<dyn ParticipantRepository>,
    repository_timeout: Duration,
    metrics: Arc<MetricsCollector>,
}

/// Reporting claim on one match; puts the match back to `Open` unless completed
struct ReportClaim<'a> {
    lifecycle: &'a MatchLifecycle,
    match_id: MatchId,
    completed: bool,
}

impl ReportClaim<'_> {
    /// Remove the match for good
    fn complete(mut self) -> Option<ActiveMatch> {
        self.completed = true;
        self.lifecycle
            .matches
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.match_id)
    }
}

impl Drop for ReportClaim<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let mut matches = self
            .lifecycle
            .matches
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = matches.get_mut(&self.match_id) {
            active.state = MatchState::Open;
            debug!("Released report claim on match {}", self.match_id);
        }
    }
}

impl MatchLifecycle {
    pub fn new(
        policy: Arc<dyn RatingPolicy>,
        repository: Arc<dyn ParticipantRepository>,
        repository_timeout: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            matches: RwLock::new(HashMap::new()),
            policy,
            repository,
            repository_timeout,
            metrics,
        }
    }

    /// Open a match for a pairing taken out of the queue
    pub fn create(&self, a: &QueueEntry, b: &QueueEntry) -> ActiveMatch {
        let now = current_timestamp();
        let projection = match self.policy.project(&a.rating, &b.rating, now) {
            Ok(projection) => Some(projection),
            Err(e) => {
                warn!(
                    "Could not project outcomes for {} vs {}: {}",
                    a.participant, b.participant, e
                );
                None
            }
        };

        let active = ActiveMatch {
            match_id: generate_match_id(),
            participant_a: a.participant.clone(),
            participant_b: b.participant.clone(),
            projection,
            state: MatchState::Open,
            created_at: now,
        };

        self.matches
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(active.match_id, active.clone());

        info!(
            "Created match {}: {} vs {}",
            active.match_id, active.participant_a, active.participant_b
        );
        active
    }

    /// Apply a result and close the match.
    ///
    /// On any error the match stays open and nothing has been persisted.
    pub async fn report_result(
        &self,
        match_id: MatchId,
        winner_user: UserId,
    ) -> Result<(ActiveMatch, MatchRatingUpdate), MatchError> {
        let (claim, active) = self.claim(match_id, winner_user)?;
        let (winner_id, loser_id) = match active.sides_for_winner(winner_user) {
            Some((winner, loser)) => (winner.clone(), loser.clone()),
            None => {
                return Err(MatchError::NotAParticipant {
                    match_id,
                    user_id: winner_user,
                })
            }
        };

        let update = self.rate_and_commit(match_id, &winner_id, &loser_id).await?;
        let finished = claim.complete().unwrap_or(active);
        Ok((finished, update))
    }

    /// Rate a result that was played outside the queue. The caller makes
    /// sure neither side is in an open match.
    pub async fn report_direct(
        &self,
        winner_id: &ParticipantId,
        loser_id: &ParticipantId,
    ) -> Result<(MatchId, MatchRatingUpdate), MatchError> {
        let match_id = generate_match_id();
        let update = self.rate_and_commit(match_id, winner_id, loser_id).await?;
        Ok((match_id, update))
    }

    /// Close a match without touching ratings
    pub fn cancel(&self, match_id: MatchId) -> Result<ActiveMatch, MatchError> {
        let mut matches = self.matches.write().unwrap_or_else(PoisonError::into_inner);
        let state = matches
            .get(&match_id)
            .map(|active| active.state)
            .ok_or(MatchError::UnknownMatch { match_id })?;
        if state == MatchState::Reporting {
            return Err(MatchError::ReportInProgress { match_id });
        }
        let cancelled = matches
            .remove(&match_id)
            .ok_or(MatchError::UnknownMatch { match_id })?;
        info!("Cancelled match {}", match_id);
        Ok(cancelled)
    }

    pub fn get(&self, match_id: MatchId) -> Option<ActiveMatch> {
        self.matches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&match_id)
            .cloned()
    }

    /// Open matches, oldest first
    pub fn list(&self) -> Vec<ActiveMatch> {
        let mut matches: Vec<ActiveMatch> = self
            .matches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        matches.sort_by_key(|active| active.created_at);
        matches
    }

    pub fn active_count(&self) -> usize {
        self.matches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The open match a user plays in, if any
    pub fn match_for_user(&self, user_id: UserId) -> Option<ActiveMatch> {
        self.matches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|active| active.involves_user(user_id))
            .cloned()
    }

    /// Apply the policy to both records and persist them with a history row
    async fn rate_and_commit(
        &self,
        match_id: MatchId,
        winner_id: &ParticipantId,
        loser_id: &ParticipantId,
    ) -> Result<MatchRatingUpdate, MatchError> {
        let timer = self.metrics.start_timer();
        let now = current_timestamp();
        let winner = self.fetch_record(winner_id).await?;
        let loser = self.fetch_record(loser_id).await?;

        let update = self.policy.apply_result(&winner, &loser, now)?;

        let history = MatchHistoryEntry {
            match_id,
            winner: winner_id.clone(),
            loser: loser_id.clone(),
            winner_rating_before: update.winner.before.rating,
            winner_rating_after: update.winner.after.rating,
            loser_rating_before: update.loser.before.rating,
            loser_rating_after: update.loser.after.rating,
            reported_at: now,
        };
        bounded(
            self.repository_timeout,
            self.repository.commit_match_result(
                update.winner.after.clone(),
                update.loser.after.clone(),
                history,
            ),
        )
        .await?;
        self.metrics.record_rating_update(&update, timer.stop());

        info!(
            "Match {} reported: {} {:.1} -> {:.1}, {} {:.1} -> {:.1}",
            match_id,
            winner_id,
            update.winner.before.rating,
            update.winner.after.rating,
            loser_id,
            update.loser.before.rating,
            update.loser.after.rating
        );
        Ok(update)
    }

    fn claim(
        &self,
        match_id: MatchId,
        winner_user: UserId,
    ) -> Result<(ReportClaim<'_>, ActiveMatch), MatchError> {
        let mut matches = self.matches.write().unwrap_or_else(PoisonError::into_inner);
        let active = matches
            .get_mut(&match_id)
            .ok_or(MatchError::UnknownMatch { match_id })?;
        if !active.involves_user(winner_user) {
            return Err(MatchError::NotAParticipant {
                match_id,
                user_id: winner_user,
            });
        }
        if active.state == MatchState::Reporting {
            return Err(MatchError::ReportInProgress { match_id });
        }
        active.state = MatchState::Reporting;

        Ok((
            ReportClaim {
                lifecycle: self,
                match_id,
                completed: false,
            },
            active.clone(),
        ))
    }

    async fn fetch_record(&self, participant: &ParticipantId) -> Result<RatingRecord, MatchError> {
        bounded(
            self.repository_timeout,
            self.repository.get_rating(participant),
        )
        .await?
        .ok_or_else(|| {
            RepositoryError::NotFound {
                participant: participant.clone(),
            }
            .into()
        })
    }
}
