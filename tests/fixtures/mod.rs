//! Test fixtures and repository wrappers for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ranked_ladder::amqp::RecordingEventPublisher;
use ranked_ladder::config::{MatchmakingSettings, RatingSettings};
use ranked_ladder::error::RepositoryError;
use ranked_ladder::metrics::MetricsCollector;
use ranked_ladder::rating::{build_policy, InMemoryParticipantRepository, ParticipantRepository};
use ranked_ladder::service::MatchmakingService;
use ranked_ladder::types::{
    MatchHistoryEntry, ParticipantId, RatingRecord, TierStanding, UserId,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory repository with switches for injecting failures
#[derive(Debug, Default)]
pub struct FlakyRepository {
    inner: InMemoryParticipantRepository,
    fail_commits: AtomicBool,
    fail_reads_for: Mutex<HashSet<ParticipantId>>,
    commits: AtomicUsize,
}

impl FlakyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Make `get_rating` fail for one participant
    pub fn fail_reads_for(&self, participant: ParticipantId) {
        self.fail_reads_for.lock().unwrap().insert(participant);
    }

    pub fn heal_reads(&self) {
        self.fail_reads_for.lock().unwrap().clear();
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn unavailable() -> RepositoryError {
        RepositoryError::Unavailable {
            message: "injected failure".to_string(),
        }
    }
}

#[async_trait]
impl ParticipantRepository for FlakyRepository {
    async fn get_rating(
        &self,
        participant: &ParticipantId,
    ) -> Result<Option<RatingRecord>, RepositoryError> {
        if self.fail_reads_for.lock().unwrap().contains(participant) {
            return Err(Self::unavailable());
        }
        self.inner.get_rating(participant).await
    }

    async fn put_rating(&self, record: RatingRecord) -> Result<(), RepositoryError> {
        self.inner.put_rating(record).await
    }

    async fn insert_rating(&self, record: RatingRecord) -> Result<(), RepositoryError> {
        self.inner.insert_rating(record).await
    }

    async fn remove_rating(&self, participant: &ParticipantId) -> Result<bool, RepositoryError> {
        self.inner.remove_rating(participant).await
    }

    async fn append_match_history(&self, entry: MatchHistoryEntry) -> Result<(), RepositoryError> {
        self.inner.append_match_history(entry).await
    }

    async fn remove_last_match(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Option<MatchHistoryEntry>, RepositoryError> {
        self.inner.remove_last_match(user_a, user_b).await
    }

    async fn list_active_characters(&self) -> Result<Vec<RatingRecord>, RepositoryError> {
        self.inner.list_active_characters().await
    }

    async fn list_match_history(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<MatchHistoryEntry>, RepositoryError> {
        self.inner.list_match_history(user_id).await
    }

    async fn get_rating_period_start(&self) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        self.inner.get_rating_period_start().await
    }

    async fn set_rating_period_start(&self, start: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.inner.set_rating_period_start(start).await
    }

    async fn commit_match_result(
        &self,
        winner: RatingRecord,
        loser: RatingRecord,
        history: MatchHistoryEntry,
    ) -> Result<(), RepositoryError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit_match_result(winner, loser, history).await
    }

    async fn put_rating_if_unchanged(
        &self,
        expected: &RatingRecord,
        record: RatingRecord,
    ) -> Result<bool, RepositoryError> {
        self.inner.put_rating_if_unchanged(expected, record).await
    }
}

/// A matchmaking service plus handles on its collaborators
pub struct TestLadder {
    pub service: MatchmakingService,
    pub repository: Arc<FlakyRepository>,
    pub publisher: Arc<RecordingEventPublisher>,
}

/// Settings that keep the retry timer out of the way; passes are forced
pub fn create_test_settings() -> MatchmakingSettings {
    MatchmakingSettings {
        matchmaking_delay_ms: 3_600_000,
        max_active_matches: 16,
        ..MatchmakingSettings::default()
    }
}

pub fn create_test_ladder(settings: MatchmakingSettings) -> TestLadder {
    create_test_ladder_with_rating(settings, RatingSettings::default())
}

pub fn create_test_ladder_with_rating(
    settings: MatchmakingSettings,
    rating: RatingSettings,
) -> TestLadder {
    let repository = Arc::new(FlakyRepository::new());
    let publisher = Arc::new(RecordingEventPublisher::new());
    let service = MatchmakingService::new(
        settings,
        build_policy(&rating),
        repository.clone(),
        publisher.clone(),
        Arc::new(MetricsCollector::new().expect("Failed to create metrics collector")),
    );
    TestLadder {
        service,
        repository,
        publisher,
    }
}

/// Register and queue each `(user, character)` in order
pub async fn register_and_join(ladder: &TestLadder, players: &[(UserId, &str)]) {
    for (user_id, character) in players {
        ladder
            .service
            .register_character(*user_id, character)
            .await
            .expect("register");
        ladder
            .service
            .join_queue(*user_id, character)
            .await
            .expect("join");
    }
}

/// Overwrite a stored rating
pub async fn set_rating(ladder: &TestLadder, user_id: UserId, character: &str, rating: f64) {
    let participant = ParticipantId::new(user_id, character);
    let mut record = ladder
        .repository
        .get_rating(&participant)
        .await
        .unwrap()
        .expect("registered");
    record.rating = rating;
    ladder.repository.put_rating(record).await.unwrap();
}

pub fn create_test_record(
    user_id: UserId,
    character: &str,
    rating: f64,
    rating_deviation: f64,
    last_rated_at: DateTime<Utc>,
) -> RatingRecord {
    RatingRecord {
        participant: ParticipantId::new(user_id, character),
        rating,
        rating_deviation,
        volatility: 0.06,
        standing: TierStanding::default(),
        games_played: 0,
        last_rated_at,
    }
}
