//! Rating period clock
//!
//! Periods are aligned to the stored period start: boundaries fall at
//! `start + n * period`. Closing a period inflates the deviation of every
//! record last rated before the old period start and stamps it with the new
//! boundary. Records rated during the closing period are left alone; their
//! next update counts the time since they were last rated.

use crate::amqp::EventPublisher;
use crate::error::RepositoryError;
use crate::metrics::MetricsCollector;
use crate::rating::{bounded, ParticipantRepository, RatingPolicy};
use crate::types::RatingPeriodClosed;
use crate::utils::{current_timestamp, to_chrono};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Retry delay when the repository cannot be reached
const CLOCK_RETRY_DELAY: Duration = Duration::from_secs(60);

pub struct RatingPeriodClock {
    repository: Arc<dyn ParticipantRepository>,
    policy: Arc<dyn RatingPolicy>,
    period: Duration,
    repository_timeout: Duration,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<MetricsCollector>,
}

impl RatingPeriodClock {
    pub fn new(
        repository: Arc<dyn ParticipantRepository>,
        policy: Arc<dyn RatingPolicy>,
        period: Duration,
        repository_timeout: Duration,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            repository,
            policy,
            period,
            repository_timeout,
            publisher,
            metrics,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stored period start, initialised to `now` when missing
    pub async fn current_start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, RepositoryError> {
        let stored = bounded(
            self.repository_timeout,
            self.repository.get_rating_period_start(),
        )
        .await?;
        match stored {
            Some(start) => Ok(start),
            None => {
                bounded(
                    self.repository_timeout,
                    self.repository.set_rating_period_start(now),
                )
                .await?;
                info!("Initialised rating period start to {}", now);
                Ok(now)
            }
        }
    }

    /// Start of the next period after `now`
    pub async fn next_boundary(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, RepositoryError> {
        let start = self.current_start(now).await?;
        let (_, boundary) = self.boundary_for(start, now);
        Ok(boundary + self.period_chrono())
    }

    /// Close every full period that has elapsed by `now`.
    /// Returns the closure event, or None when the current period is still open.
    pub async fn catch_up(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<RatingPeriodClosed>, RepositoryError> {
        let start = self.current_start(now).await?;
        let (closed, boundary) = self.boundary_for(start, now);
        if closed == 0 {
            debug!("Rating period starting {} still open", start);
            return Ok(None);
        }

        let records = bounded(
            self.repository_timeout,
            self.repository.list_active_characters(),
        )
        .await?;

        let mut inflated = 0;
        for record in records.iter().filter(|record| record.last_rated_at < start) {
            let updated = match self.policy.apply_inactivity(record, boundary) {
                Ok(updated) => updated,
                Err(e) => {
                    error!("Could not inflate {}: {}", record.participant, e);
                    continue;
                }
            };
            if &updated == record {
                continue;
            }

            let written = bounded(
                self.repository_timeout,
                self.repository.put_rating_if_unchanged(record, updated),
            )
            .await?;
            if written {
                inflated += 1;
            } else {
                debug!(
                    "{} changed while closing the period, left as is",
                    record.participant
                );
            }
        }

        bounded(
            self.repository_timeout,
            self.repository.set_rating_period_start(boundary),
        )
        .await?;

        let event = RatingPeriodClosed {
            period_start: boundary,
            records_inflated: inflated,
            timestamp: now,
        };
        self.metrics.record_rating_period_closed(inflated);
        info!(
            "Closed {} rating period(s); new period starts {}, {} records inflated",
            closed, boundary, inflated
        );

        if let Err(e) = self
            .publisher
            .publish_rating_period_closed(event.clone())
            .await
        {
            warn!("Failed to publish RatingPeriodClosed: {}", e);
        }
        Ok(Some(event))
    }

    /// Run catch-up at every boundary until a shutdown signal arrives
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Rating period clock started (period {:?})", self.period);
            loop {
                let wait = match self.catch_up(current_timestamp()).await {
                    Ok(_) => match self.next_boundary(current_timestamp()).await {
                        Ok(boundary) => (boundary - current_timestamp())
                            .to_std()
                            .unwrap_or_default()
                            .max(Duration::from_secs(1)),
                        Err(e) => {
                            warn!("Could not read rating period start: {}", e);
                            CLOCK_RETRY_DELAY
                        }
                    },
                    Err(e) => {
                        warn!("Rating period catch-up failed: {}", e);
                        CLOCK_RETRY_DELAY
                    }
                };

                debug!("Next rating period check in {:?}", wait);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shutdown.recv() => {
                        info!("Rating period clock stopped");
                        break;
                    }
                }
            }
        })
    }

    fn period_chrono(&self) -> chrono::Duration {
        to_chrono(self.period)
    }

    /// Number of whole periods elapsed since `start` and the latest boundary
    fn boundary_for(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> (i64, DateTime<Utc>) {
        let period_ms = self.period_chrono().num_milliseconds();
        let elapsed_ms = (now - start).num_milliseconds();
        if period_ms <= 0 || elapsed_ms < period_ms {
            return (0, start);
        }
        let closed = elapsed_ms / period_ms;
        (closed, start + chrono::Duration::milliseconds(closed * period_ms))
    }
}
