//! Matchmaking service
//!
//! The command surface of the ladder. Queue mutations and whole matchmaking
//! passes run under one async mutex; match reports only take that lock briefly
//! to clear in-match flags once the rating update is persisted. Events are
//! published after the lock has been released.

use crate::amqp::EventPublisher;
use crate::config::{MatchmakingSettings, RatingPolicyKind};
use crate::error::{MatchError, QueueError};
use crate::matches::MatchLifecycle;
use crate::metrics::MetricsCollector;
use crate::queue::{Matchmaker, QueueStore};
use crate::rating::glicko2::{self, Glicko2Rating};
use crate::rating::{bounded, ParticipantRepository, RatingPolicy};
use crate::service::timer::RetryTimer;
use crate::types::{
    ActiveMatch, CharacterStats, LadderStats, LeaderboardEntry, MatchCancelled, MatchCreated,
    MatchHistoryEntry, MatchId, MatchReported, ParticipantId, PlayerStats, QueueEntry, QueuePosition,
    QueueSnapshotEntry, RatingDelta, RatingRecord, UserId,
};
use crate::utils::current_timestamp;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Everything guarded by the queue lock
struct QueueState {
    store: QueueStore,
    timer: RetryTimer,
    max_active_matches: usize,
}

#[derive(Debug, Default)]
struct ServiceCounters {
    players_queued: AtomicU64,
    matches_created: AtomicU64,
    matches_reported: AtomicU64,
    matches_cancelled: AtomicU64,
    passes_run: AtomicU64,
}

/// Queue, matchmaker and match lifecycle behind one handle
#[derive(Clone)]
pub struct MatchmakingService {
    queue: Arc<Mutex<QueueState>>,
    lifecycle: Arc<MatchLifecycle>,
    matchmaker: Arc<Matchmaker>,
    policy: Arc<dyn RatingPolicy>,
    repository: Arc<dyn ParticipantRepository>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<MetricsCollector>,
    settings: MatchmakingSettings,
    counters: Arc<ServiceCounters>,
    /// Serialises the character-cap check with the insert
    registration: Arc<Mutex<()>>,
}

impl MatchmakingService {
    pub fn new(
        settings: MatchmakingSettings,
        policy: Arc<dyn RatingPolicy>,
        repository: Arc<dyn ParticipantRepository>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let state = QueueState {
            store: QueueStore::new(settings.recent_opponents_limit, settings.queue_open),
            timer: RetryTimer::new(),
            max_active_matches: settings.max_active_matches,
        };
        let lifecycle = MatchLifecycle::new(
            policy.clone(),
            repository.clone(),
            settings.repository_timeout(),
            metrics.clone(),
        );

        info!(
            "Matchmaking service ready: policy={:?}, max_active_matches={}, delay={:?}",
            policy.kind(),
            settings.max_active_matches,
            settings.matchmaking_delay()
        );

        Self {
            queue: Arc::new(Mutex::new(state)),
            lifecycle: Arc::new(lifecycle),
            matchmaker: Arc::new(Matchmaker::new(policy.clone())),
            policy,
            repository,
            publisher,
            metrics,
            settings,
            counters: Arc::new(ServiceCounters::default()),
            registration: Arc::new(Mutex::new(())),
        }
    }

    pub fn policy(&self) -> Arc<dyn RatingPolicy> {
        self.policy.clone()
    }

    pub fn settings(&self) -> &MatchmakingSettings {
        &self.settings
    }

    fn repository_timeout(&self) -> Duration {
        self.settings.repository_timeout()
    }

    /// Create a rating record for a new character
    pub async fn register_character(
        &self,
        user_id: UserId,
        character: &str,
    ) -> Result<RatingRecord, QueueError> {
        let participant = ParticipantId::new(user_id, character);
        let _registration = self.registration.lock().await;
        let existing = bounded(
            self.repository_timeout(),
            self.repository.characters_for_user(user_id),
        )
        .await?;

        if existing.iter().any(|record| record.participant == participant) {
            return Err(QueueError::AlreadyRegistered { participant });
        }
        let limit = self.settings.max_characters_per_user;
        if existing.len() >= limit {
            return Err(QueueError::TooManyCharacters { user_id, limit });
        }

        let record = self
            .policy
            .initial_record(participant.clone(), current_timestamp());
        bounded(
            self.repository_timeout(),
            self.repository.insert_rating(record.clone()),
        )
        .await?;

        info!("Registered {}", participant);
        Ok(record)
    }

    /// Remove a character's record and any queue state it has
    pub async fn unregister_character(
        &self,
        user_id: UserId,
        character: &str,
    ) -> Result<(), QueueError> {
        let participant = ParticipantId::new(user_id, character);
        let mut state = self.queue.lock().await;
        if state.store.is_user_in_match(user_id) {
            return Err(QueueError::AlreadyInMatch { user_id });
        }

        let removed = bounded(
            self.repository_timeout(),
            self.repository.remove_rating(&participant),
        )
        .await?;
        if !removed {
            return Err(QueueError::NotRegistered { participant });
        }
        state.store.forget(&participant);

        info!("Unregistered {}", participant);
        Ok(())
    }

    /// Put a registered character at the tail of the queue
    pub async fn join_queue(
        &self,
        user_id: UserId,
        character: &str,
    ) -> Result<QueuePosition, QueueError> {
        let participant = ParticipantId::new(user_id, character);
        let record = bounded(
            self.repository_timeout(),
            self.repository.get_rating(&participant),
        )
        .await;
        let record = match record {
            Ok(Some(record)) => record,
            Ok(None) => {
                let err = QueueError::NotRegistered { participant };
                self.metrics.record_join(err.kind(), self.queue.lock().await.store.len());
                return Err(err);
            }
            Err(e) => {
                let err = QueueError::from(e);
                warn!("Join by {} failed: {}", participant, err);
                return Err(err);
            }
        };

        let mut state = self.queue.lock().await;
        let entry = QueueEntry {
            participant: participant.clone(),
            rating: record,
            enqueued_at: current_timestamp(),
        };
        match state.store.enqueue(entry) {
            Ok(position) => {
                self.counters.players_queued.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_join("ok", state.store.len());
                self.schedule_pass(&mut state);
                info!(
                    "{} joined the queue at position {}/{}",
                    participant, position.position, position.queue_length
                );
                Ok(position)
            }
            Err(err) => {
                self.metrics.record_join(err.kind(), state.store.len());
                debug!("Join by {} rejected: {}", participant, err);
                Err(err)
            }
        }
    }

    /// Leave with one character, or every character when `character` is None
    pub async fn leave_queue(
        &self,
        user_id: UserId,
        character: Option<&str>,
    ) -> Result<usize, QueueError> {
        let mut state = self.queue.lock().await;
        let removed = match character {
            Some(character) => state
                .store
                .dequeue(&ParticipantId::new(user_id, character))
                .into_iter()
                .count(),
            None => state.store.dequeue_user(user_id).len(),
        };

        if removed == 0 {
            return Err(QueueError::NotQueued { user_id });
        }
        self.metrics.record_leave(removed, state.store.len());
        info!("User {} left the queue ({} entries)", user_id, removed);
        Ok(removed)
    }

    /// Apply a result. Returns the winner's and the loser's rating deltas.
    pub async fn report_result(
        &self,
        match_id: MatchId,
        winner_user: UserId,
    ) -> Result<(RatingDelta, RatingDelta), MatchError> {
        let (closed, update) = match self.lifecycle.report_result(match_id, winner_user).await {
            Ok(result) => result,
            Err(err) => {
                self.metrics
                    .record_report(err.kind(), self.lifecycle.active_count());
                warn!("Report for match {} failed: {}", match_id, err);
                return Err(err);
            }
        };

        {
            let mut state = self.queue.lock().await;
            state.store.clear_in_match(closed.participant_a.user_id);
            state.store.clear_in_match(closed.participant_b.user_id);
            if !self.settings.requeue_after_report {
                self.schedule_pass(&mut state);
            }
        }
        self.counters.matches_reported.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .record_report("ok", self.lifecycle.active_count());

        let event = MatchReported {
            match_id,
            winner: update.winner.clone(),
            loser: update.loser.clone(),
            timestamp: current_timestamp(),
        };
        if let Err(e) = self.publisher.publish_match_reported(event).await {
            warn!("Failed to publish MatchReported for {}: {}", match_id, e);
        }

        if self.settings.requeue_after_report {
            for participant in [&update.winner.participant, &update.loser.participant] {
                if let Err(e) = self
                    .join_queue(participant.user_id, &participant.character)
                    .await
                {
                    warn!("Could not requeue {} after match {}: {}", participant, match_id, e);
                }
            }
        }

        Ok((update.winner, update.loser))
    }

    /// Rate a result played outside the queue, such as a set arranged
    /// directly between two players. Rejected while either user has an open
    /// match.
    pub async fn report_direct_result(
        &self,
        winner: ParticipantId,
        loser: ParticipantId,
    ) -> Result<(RatingDelta, RatingDelta), MatchError> {
        if winner.user_id == loser.user_id {
            return Err(MatchError::SameUser {
                user_id: winner.user_id,
            });
        }

        // Held so a pass cannot pair either side while the result is applied
        let state = self.queue.lock().await;
        for user_id in [winner.user_id, loser.user_id] {
            if state.store.is_user_in_match(user_id) {
                return Err(MatchError::ParticipantInMatch { user_id });
            }
        }
        let (match_id, update) = match self.lifecycle.report_direct(&winner, &loser).await {
            Ok(result) => result,
            Err(err) => {
                self.metrics
                    .record_report(err.kind(), self.lifecycle.active_count());
                warn!("Direct report {} over {} failed: {}", winner, loser, err);
                return Err(err);
            }
        };
        drop(state);

        self.counters.matches_reported.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .record_report("ok", self.lifecycle.active_count());

        let event = MatchReported {
            match_id,
            winner: update.winner.clone(),
            loser: update.loser.clone(),
            timestamp: current_timestamp(),
        };
        if let Err(e) = self.publisher.publish_match_reported(event).await {
            warn!("Failed to publish MatchReported for {}: {}", match_id, e);
        }
        Ok((update.winner, update.loser))
    }

    /// Overwrite a character's rating. Deviation and volatility keep their
    /// stored values unless given.
    pub async fn set_rating(
        &self,
        participant: ParticipantId,
        rating: f64,
        deviation: Option<f64>,
        volatility: Option<f64>,
    ) -> Result<RatingRecord, QueueError> {
        if self.policy.kind() == RatingPolicyKind::Tiered {
            return Err(QueueError::InvalidRating {
                reason: "the tiered ladder ranks by tier standing".to_string(),
            });
        }
        let current = bounded(
            self.repository_timeout(),
            self.repository.get_rating(&participant),
        )
        .await?
        .ok_or_else(|| QueueError::NotRegistered {
            participant: participant.clone(),
        })?;

        let target = Glicko2Rating {
            rating,
            deviation: deviation.unwrap_or(current.rating_deviation),
            volatility: volatility.unwrap_or(current.volatility),
        };
        glicko2::validate(&target).map_err(|e| QueueError::InvalidRating {
            reason: e.to_string(),
        })?;

        let record = RatingRecord {
            rating: target.rating,
            rating_deviation: target.deviation,
            volatility: target.volatility,
            ..current
        };
        bounded(
            self.repository_timeout(),
            self.repository.put_rating(record.clone()),
        )
        .await?;

        info!(
            "Rating of {} set to {:.1} (RD {:.1}, volatility {:.4})",
            participant, record.rating, record.rating_deviation, record.volatility
        );
        Ok(record)
    }

    /// Delete the latest history row between two users. Ratings stay as they are.
    pub async fn remove_last_match(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Option<MatchHistoryEntry>, MatchError> {
        let removed = bounded(
            self.repository_timeout(),
            self.repository.remove_last_match(user_a, user_b),
        )
        .await?;
        match &removed {
            Some(entry) => info!(
                "Removed match {} ({} over {}) from history",
                entry.match_id, entry.winner, entry.loser
            ),
            None => debug!("No match between users {} and {} to remove", user_a, user_b),
        }
        Ok(removed)
    }

    /// Close a match without a result
    pub async fn cancel_match(&self, match_id: MatchId) -> Result<ActiveMatch, MatchError> {
        let cancelled = self.lifecycle.cancel(match_id)?;
        {
            let mut state = self.queue.lock().await;
            state.store.clear_in_match(cancelled.participant_a.user_id);
            state.store.clear_in_match(cancelled.participant_b.user_id);
            self.schedule_pass(&mut state);
        }
        self.counters.matches_cancelled.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_cancelled(self.lifecycle.active_count());

        let event = MatchCancelled {
            match_id,
            participant_a: cancelled.participant_a.clone(),
            participant_b: cancelled.participant_b.clone(),
            timestamp: current_timestamp(),
        };
        if let Err(e) = self.publisher.publish_match_cancelled(event).await {
            warn!("Failed to publish MatchCancelled for {}: {}", match_id, e);
        }
        Ok(cancelled)
    }

    /// Read-only snapshot of the queue in arrival order
    pub async fn view_queue(&self) -> Vec<QueueSnapshotEntry> {
        let state = self.queue.lock().await;
        state
            .store
            .peek_all_ordered_by_arrival()
            .enumerate()
            .map(|(index, entry)| QueueSnapshotEntry {
                position: index + 1,
                participant: entry.participant.clone(),
                rating: entry.rating.rating,
                rating_deviation: entry.rating.rating_deviation,
                standing: entry.rating.standing,
                bracket: self.policy.bracket_name(&entry.rating),
                recent_opponents: state.store.recent_opponents(&entry.participant),
                enqueued_at: entry.enqueued_at,
            })
            .collect()
    }

    pub fn active_matches(&self) -> Vec<ActiveMatch> {
        self.lifecycle.list()
    }

    pub fn get_match(&self, match_id: MatchId) -> Option<ActiveMatch> {
        self.lifecycle.get(match_id)
    }

    /// Run a pass now instead of waiting for the timer. Returns the matches created.
    pub async fn run_matchmaking_pass(&self) -> Vec<MatchCreated> {
        let events = {
            let mut state = self.queue.lock().await;
            let events = self.matchmaking_pass(&mut state).await;
            if state.store.is_open() && !state.store.is_empty() {
                self.schedule_pass(&mut state);
            } else {
                state.timer.cancel();
            }
            events
        };
        self.publish_created(&events).await;
        events
    }

    /// Open or close the queue. Closing drops every waiting entry and the
    /// pending timer; returns how many entries were dropped.
    pub async fn set_queue_open(&self, open: bool) -> usize {
        let mut state = self.queue.lock().await;
        let drained = state.store.set_open(open);
        if !open {
            state.timer.cancel();
        }
        self.metrics
            .queue()
            .players_waiting
            .set(state.store.len() as i64);
        info!(
            "Queue {} ({} entries dropped)",
            if open { "opened" } else { "closed" },
            drained.len()
        );
        drained.len()
    }

    pub async fn set_max_active_matches(&self, max_active_matches: usize) {
        let mut state = self.queue.lock().await;
        state.max_active_matches = max_active_matches;
        self.schedule_pass(&mut state);
        info!("Max active matches set to {}", max_active_matches);
    }

    pub async fn set_recent_opponents_limit(&self, limit: usize) {
        let mut state = self.queue.lock().await;
        state.store.set_recent_opponents_limit(limit);
        info!("Recent opponent memory set to {}", limit);
    }

    /// Top `limit` characters. Stronger bracket first, then more tier points,
    /// higher rating and lower deviation.
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, QueueError> {
        let mut records = bounded(
            self.repository_timeout(),
            self.repository.list_active_characters(),
        )
        .await?;

        records.sort_by(|a, b| {
            self.policy
                .bracket_rank(b)
                .cmp(&self.policy.bracket_rank(a))
                .then(b.standing.points.cmp(&a.standing.points))
                .then(b.rating.total_cmp(&a.rating))
                .then(a.rating_deviation.total_cmp(&b.rating_deviation))
        });

        Ok(records
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(index, record)| LeaderboardEntry {
                rank: index + 1,
                bracket: self.policy.bracket_name(&record),
                participant: record.participant,
                rating: record.rating,
                rating_deviation: record.rating_deviation,
                standing: record.standing,
                games_played: record.games_played,
            })
            .collect())
    }

    /// Ratings and win/loss counts for every character of a user
    pub async fn player_stats(&self, user_id: UserId) -> Result<PlayerStats, QueueError> {
        let records = bounded(
            self.repository_timeout(),
            self.repository.characters_for_user(user_id),
        )
        .await?;
        let history = bounded(
            self.repository_timeout(),
            self.repository.list_match_history(Some(user_id)),
        )
        .await?;

        let characters = records
            .into_iter()
            .map(|record| {
                let wins = history
                    .iter()
                    .filter(|entry| entry.winner == record.participant)
                    .count() as u64;
                let losses = history
                    .iter()
                    .filter(|entry| entry.loser == record.participant)
                    .count() as u64;
                CharacterStats {
                    bracket: self.policy.bracket_name(&record),
                    record,
                    wins,
                    losses,
                }
            })
            .collect();

        Ok(PlayerStats {
            user_id,
            characters,
        })
    }

    pub async fn get_stats(&self) -> LadderStats {
        let state = self.queue.lock().await;
        LadderStats {
            queue_open: state.store.is_open(),
            queue_length: state.store.len(),
            users_in_match: state.store.in_match_count(),
            active_matches: self.lifecycle.active_count(),
            max_active_matches: state.max_active_matches,
            recent_opponents_limit: state.store.recent_opponents_limit(),
            timer_pending: state.timer.is_pending(),
            players_queued: self.counters.players_queued.load(Ordering::Relaxed),
            matches_created: self.counters.matches_created.load(Ordering::Relaxed),
            matches_reported: self.counters.matches_reported.load(Ordering::Relaxed),
            matches_cancelled: self.counters.matches_cancelled.load(Ordering::Relaxed),
            passes_run: self.counters.passes_run.load(Ordering::Relaxed),
        }
    }

    pub async fn is_timer_pending(&self) -> bool {
        self.queue.lock().await.timer.is_pending()
    }

    /// Stop scheduling passes. Open matches are left as they are.
    pub async fn shutdown(&self) {
        let mut state = self.queue.lock().await;
        if state.timer.cancel() {
            info!("Pending matchmaking pass cancelled");
        }
    }

    /// Arm the retry timer if a pass could do anything and none is pending
    fn schedule_pass(&self, state: &mut QueueState) {
        if !state.store.is_open() || state.store.len() < 2 {
            return;
        }
        let service = self.clone();
        let delay = self.settings.matchmaking_delay();
        state
            .timer
            .arm(move |generation| async move { service.run_timer(generation, delay).await });
    }

    /// Body of the retry timer task
    async fn run_timer(self, generation: u64, delay: Duration) {
        loop {
            tokio::time::sleep(delay).await;

            let (events, keep_running) = {
                let mut state = self.queue.lock().await;
                if !state.timer.is_current(generation) {
                    debug!("Stale matchmaking timer (generation {}) exiting", generation);
                    return;
                }
                let events = self.matchmaking_pass(&mut state).await;
                let keep_running = state.store.is_open() && !state.store.is_empty();
                if !keep_running {
                    state.timer.finish(generation);
                }
                (events, keep_running)
            };

            self.publish_created(&events).await;
            if !keep_running {
                debug!("Queue drained, matchmaking timer stopped");
                return;
            }
        }
    }

    /// One full pass under the queue lock
    async fn matchmaking_pass(&self, state: &mut QueueState) -> Vec<MatchCreated> {
        let timer = self.metrics.start_timer();
        let sitting_out = self.validate_entries(state).await;

        let slots = state
            .max_active_matches
            .saturating_sub(self.lifecycle.active_count());
        let outcome = self
            .matchmaker
            .run_pass(&mut state.store, slots, &sitting_out);

        let mut events = Vec::with_capacity(outcome.pairings.len());
        for pairing in outcome.pairings {
            let active = self.lifecycle.create(&pairing.anchor, &pairing.opponent);
            let now = current_timestamp();
            let waited = [&pairing.anchor, &pairing.opponent]
                .map(|entry| (now - entry.enqueued_at).to_std().unwrap_or_default());
            self.metrics
                .record_match_created(waited, self.lifecycle.active_count());
            self.counters.matches_created.fetch_add(1, Ordering::Relaxed);

            events.push(MatchCreated {
                match_id: active.match_id,
                participant_a: active.participant_a,
                participant_b: active.participant_b,
                projection: active.projection,
                timestamp: now,
            });
        }

        self.counters.passes_run.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .record_pass(outcome.stop, timer.stop(), state.store.len());
        events
    }

    /// Refresh every waiting entry from the repository. Unregistered entries
    /// are purged; entries whose lookup failed sit this pass out.
    async fn validate_entries(&self, state: &mut QueueState) -> HashSet<ParticipantId> {
        let waiting: Vec<ParticipantId> = state
            .store
            .peek_all_ordered_by_arrival()
            .map(|entry| entry.participant.clone())
            .collect();

        let mut sitting_out = HashSet::new();
        let mut purged = 0;
        for participant in waiting {
            match bounded(
                self.repository_timeout(),
                self.repository.get_rating(&participant),
            )
            .await
            {
                Ok(Some(record)) => {
                    state.store.refresh_rating(record);
                }
                Ok(None) => {
                    warn!("{} is no longer registered, removing from queue", participant);
                    state.store.forget(&participant);
                    purged += 1;
                }
                Err(e) => {
                    warn!("Skipping {} this pass: {}", participant, e);
                    sitting_out.insert(participant);
                }
            }
        }

        if purged > 0 {
            self.metrics.record_purged(purged);
        }
        sitting_out
    }

    async fn publish_created(&self, events: &[MatchCreated]) {
        for event in events {
            if let Err(e) = self.publisher.publish_match_created(event.clone()).await {
                warn!("Failed to publish MatchCreated for {}: {}", event.match_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::RecordingEventPublisher;
    use crate::rating::InMemoryParticipantRepository;

    fn create_test_service(
        settings: MatchmakingSettings,
    ) -> (MatchmakingService, Arc<RecordingEventPublisher>) {
        let policy = crate::rating::build_policy(&crate::config::RatingSettings::default());
        let publisher = Arc::new(RecordingEventPublisher::new());
        let service = MatchmakingService::new(
            settings,
            policy,
            Arc::new(InMemoryParticipantRepository::new()),
            publisher.clone(),
            Arc::new(MetricsCollector::new().unwrap()),
        );
        (service, publisher)
    }

    #[tokio::test]
    async fn test_register_limits() {
        let (service, _) = create_test_service(MatchmakingSettings {
            max_characters_per_user: 2,
            ..MatchmakingSettings::default()
        });

        service.register_character(1, "ryu").await.unwrap();
        assert!(matches!(
            service.register_character(1, "ryu").await,
            Err(QueueError::AlreadyRegistered { .. })
        ));
        service.register_character(1, "ken").await.unwrap();
        assert_eq!(
            service.register_character(1, "guile").await.unwrap_err(),
            QueueError::TooManyCharacters {
                user_id: 1,
                limit: 2
            }
        );
    }

    #[tokio::test]
    async fn test_join_requires_registration() {
        let (service, _) = create_test_service(MatchmakingSettings::default());
        assert!(matches!(
            service.join_queue(1, "ryu").await,
            Err(QueueError::NotRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn test_forced_pass_pairs_and_publishes() {
        let (service, publisher) = create_test_service(MatchmakingSettings::default());
        for (user, character) in [(1, "ryu"), (2, "ken")] {
            service.register_character(user, character).await.unwrap();
            service.join_queue(user, character).await.unwrap();
        }

        let created = service.run_matchmaking_pass().await;

        assert_eq!(created.len(), 1);
        assert_eq!(publisher.match_created().len(), 1);
        assert!(service.view_queue().await.is_empty());
        let stats = service.get_stats().await;
        assert_eq!(stats.active_matches, 1);
        assert_eq!(stats.users_in_match, 2);
        assert!(!stats.timer_pending);
    }

    #[tokio::test]
    async fn test_unregister_purges_queue_entry() {
        let (service, _) = create_test_service(MatchmakingSettings::default());
        service.register_character(1, "ryu").await.unwrap();
        service.join_queue(1, "ryu").await.unwrap();

        service.unregister_character(1, "ryu").await.unwrap();
        assert!(service.view_queue().await.is_empty());
        assert!(matches!(
            service.unregister_character(1, "ryu").await,
            Err(QueueError::NotRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn test_leave_all_characters() {
        let (service, _) = create_test_service(MatchmakingSettings::default());
        for character in ["ryu", "ken"] {
            service.register_character(1, character).await.unwrap();
            service.join_queue(1, character).await.unwrap();
        }

        assert_eq!(service.leave_queue(1, None).await.unwrap(), 2);
        assert_eq!(
            service.leave_queue(1, Some("ryu")).await.unwrap_err(),
            QueueError::NotQueued { user_id: 1 }
        );
    }
}
