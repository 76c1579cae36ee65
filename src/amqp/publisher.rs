//! AMQP event publisher for outbound events

use crate::amqp::messages::{
    event_key, routing_key, MessageEnvelope, MATCH_CANCELLED_ROUTING_KEY, MATCH_CREATED_ROUTING_KEY,
    MATCH_REPORTED_ROUTING_KEY, RATING_PERIOD_CLOSED_ROUTING_KEY,
};
use crate::error::{LadderError, Result};
use crate::metrics::MetricsCollector;
use crate::types::*;
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Trait for publishing ladder events
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a MatchCreated event
    async fn publish_match_created(&self, event: MatchCreated) -> Result<()>;

    /// Publish a MatchReported event
    async fn publish_match_reported(&self, event: MatchReported) -> Result<()>;

    /// Publish a MatchCancelled event
    async fn publish_match_cancelled(&self, event: MatchCancelled) -> Result<()>;

    /// Publish a RatingPeriodClosed event
    async fn publish_rating_period_closed(&self, event: RatingPeriodClosed) -> Result<()>;
}

/// Configuration for event publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub exchange_name: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub enable_deduplication: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            exchange_name: crate::amqp::messages::LADDER_EVENTS_EXCHANGE.to_string(),
            max_retries: 3,
            retry_delay_ms: 500,
            enable_deduplication: true,
        }
    }
}

/// AMQP-based event publisher implementation
pub struct AmqpEventPublisher {
    channel: Channel,
    config: PublisherConfig,
    metrics: Option<Arc<MetricsCollector>>,
    published: Mutex<PublishedKeys>,
}

/// Keys of recently published events, oldest evicted first
#[derive(Debug, Default)]
struct PublishedKeys {
    keys: HashSet<String>,
    order: VecDeque<String>,
}

impl PublishedKeys {
    const CAPACITY: usize = 10_000;

    fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn insert(&mut self, key: String) {
        if !self.keys.insert(key.clone()) {
            return;
        }
        self.order.push_back(key);
        if self.order.len() > Self::CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
    }
}

impl AmqpEventPublisher {
    /// Create a new event publisher and declare its exchange
    pub async fn new(channel: Channel, config: PublisherConfig) -> Result<Self> {
        let publisher = Self {
            channel,
            config,
            metrics: None,
            published: Mutex::new(PublishedKeys::default()),
        };

        publisher.setup_exchange().await?;

        Ok(publisher)
    }

    /// Count publish outcomes in the given collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn setup_exchange(&self) -> Result<()> {
        let args = ExchangeDeclareArguments::new(&self.config.exchange_name, "topic")
            .durable(true)
            .finish();
        self.channel.exchange_declare(args).await.map_err(|e| {
            LadderError::AmqpConnectionFailed {
                message: format!(
                    "Failed to declare exchange {}: {}",
                    self.config.exchange_name, e
                ),
            }
        })?;

        info!("Declared AMQP exchange '{}'", self.config.exchange_name);
        Ok(())
    }

    async fn publish_event(&self, event: LadderEvent) -> Result<()> {
        let key = routing_key(&event);
        let correlation_id = event_key(&event);
        let envelope = MessageEnvelope::with_correlation_id(event, key.to_string(), correlation_id);
        let result = self.publish_with_retry(&envelope).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_amqp_operation(key, result.is_ok());
        }
        result
    }

    /// Publish to the configured exchange with retry logic
    async fn publish_with_retry<T>(&self, envelope: &MessageEnvelope<T>) -> Result<()>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        if self.config.enable_deduplication && self.already_published(&envelope.correlation_id)? {
            debug!(
                "Message {} already published, skipping",
                envelope.correlation_id
            );
            return Ok(());
        }

        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(envelope).await {
                Ok(_) => {
                    if self.config.enable_deduplication {
                        self.published
                            .lock()
                            .map_err(|_| LadderError::InternalError {
                                message: "Failed to acquire published keys lock".to_string(),
                            })?
                            .insert(envelope.correlation_id.clone());
                    }

                    debug!(
                        "Published message {} with routing key {}",
                        envelope.correlation_id, envelope.routing_key
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish message {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for message {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    fn already_published(&self, correlation_id: &str) -> Result<bool> {
        let published = self
            .published
            .lock()
            .map_err(|_| LadderError::InternalError {
                message: "Failed to acquire published keys lock".to_string(),
            })?;
        Ok(published.contains(correlation_id))
    }

    /// Single publish attempt
    async fn try_publish<T>(&self, envelope: &MessageEnvelope<T>) -> Result<()>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(&self.config.exchange_name, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| LadderError::AmqpConnectionFailed {
                message: format!("Failed to publish message: {}", e),
            })?;

        Ok(())
    }
}

#[async_trait]
impl EventPublisher for AmqpEventPublisher {
    async fn publish_match_created(&self, event: MatchCreated) -> Result<()> {
        self.publish_event(LadderEvent::MatchCreated(event)).await
    }

    async fn publish_match_reported(&self, event: MatchReported) -> Result<()> {
        self.publish_event(LadderEvent::MatchReported(event)).await
    }

    async fn publish_match_cancelled(&self, event: MatchCancelled) -> Result<()> {
        self.publish_event(LadderEvent::MatchCancelled(event)).await
    }

    async fn publish_rating_period_closed(&self, event: RatingPeriodClosed) -> Result<()> {
        self.publish_event(LadderEvent::RatingPeriodClosed(event))
            .await
    }
}

/// Publisher used when no broker is configured; events only reach the log
#[derive(Debug, Default)]
pub struct LoggingEventPublisher;

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish_match_created(&self, event: MatchCreated) -> Result<()> {
        info!(
            "[{}] match {} created: {} vs {}",
            MATCH_CREATED_ROUTING_KEY, event.match_id, event.participant_a, event.participant_b
        );
        Ok(())
    }

    async fn publish_match_reported(&self, event: MatchReported) -> Result<()> {
        info!(
            "[{}] match {}: {} {:.0} -> {:.0}, {} {:.0} -> {:.0}",
            MATCH_REPORTED_ROUTING_KEY,
            event.match_id,
            event.winner.participant,
            event.winner.before.rating,
            event.winner.after.rating,
            event.loser.participant,
            event.loser.before.rating,
            event.loser.after.rating
        );
        Ok(())
    }

    async fn publish_match_cancelled(&self, event: MatchCancelled) -> Result<()> {
        info!(
            "[{}] match {} cancelled",
            MATCH_CANCELLED_ROUTING_KEY, event.match_id
        );
        Ok(())
    }

    async fn publish_rating_period_closed(&self, event: RatingPeriodClosed) -> Result<()> {
        info!(
            "[{}] period now starts at {}, {} records inflated",
            RATING_PERIOD_CLOSED_ROUTING_KEY, event.period_start, event.records_inflated
        );
        Ok(())
    }
}

/// Publisher that keeps every event in memory (for testing and simulation)
#[derive(Debug, Default)]
pub struct RecordingEventPublisher {
    events: std::sync::Mutex<Vec<LadderEvent>>,
    failing: std::sync::atomic::AtomicBool,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events in publish order
    pub fn events(&self) -> Vec<LadderEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn match_created(&self) -> Vec<MatchCreated> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LadderEvent::MatchCreated(created) => Some(created),
                _ => None,
            })
            .collect()
    }

    pub fn match_reported(&self) -> Vec<MatchReported> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LadderEvent::MatchReported(reported) => Some(reported),
                _ => None,
            })
            .collect()
    }

    pub fn clear_events(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    /// Make every following publish fail without recording
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    fn record(&self, event: LadderEvent) -> Result<()> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(LadderError::AmqpConnectionFailed {
                message: "publisher is failing".to_string(),
            }
            .into());
        }
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish_match_created(&self, event: MatchCreated) -> Result<()> {
        self.record(LadderEvent::MatchCreated(event))
    }

    async fn publish_match_reported(&self, event: MatchReported) -> Result<()> {
        self.record(LadderEvent::MatchReported(event))
    }

    async fn publish_match_cancelled(&self, event: MatchCancelled) -> Result<()> {
        self.record(LadderEvent::MatchCancelled(event))
    }

    async fn publish_rating_period_closed(&self, event: RatingPeriodClosed) -> Result<()> {
        self.record(LadderEvent::RatingPeriodClosed(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{current_timestamp, generate_match_id};

    fn create_test_cancelled_event() -> MatchCancelled {
        MatchCancelled {
            match_id: generate_match_id(),
            participant_a: ParticipantId::new(1, "ryu"),
            participant_b: ParticipantId::new(2, "ken"),
            timestamp: current_timestamp(),
        }
    }

    #[test]
    fn test_published_keys_evict_oldest() {
        let mut published = PublishedKeys::default();
        for i in 0..=PublishedKeys::CAPACITY {
            published.insert(format!("match.created:{}", i));
        }

        assert!(!published.contains("match.created:0"));
        assert!(published.contains("match.created:1"));
        assert_eq!(published.order.len(), PublishedKeys::CAPACITY);

        published.insert("match.created:1".to_string());
        assert_eq!(published.keys.len(), PublishedKeys::CAPACITY);
    }

    #[test]
    fn test_publisher_config_default() {
        let config = PublisherConfig::default();
        assert_eq!(config.exchange_name, "ladder.events");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 500);
        assert!(config.enable_deduplication);
    }

    #[tokio::test]
    async fn test_recording_publisher_keeps_order() {
        let publisher = RecordingEventPublisher::new();
        publisher
            .publish_match_cancelled(create_test_cancelled_event())
            .await
            .unwrap();
        publisher
            .publish_rating_period_closed(RatingPeriodClosed {
                period_start: current_timestamp(),
                records_inflated: 0,
                timestamp: current_timestamp(),
            })
            .await
            .unwrap();

        let events = publisher.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], LadderEvent::MatchCancelled(_)));
        assert!(matches!(events[1], LadderEvent::RatingPeriodClosed(_)));

        publisher.clear_events();
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_recording_publisher_failure_switch() {
        let publisher = RecordingEventPublisher::new();
        publisher.set_failing(true);
        assert!(publisher
            .publish_match_cancelled(create_test_cancelled_event())
            .await
            .is_err());
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_logging_publisher_never_fails() {
        let publisher = LoggingEventPublisher;
        assert!(publisher
            .publish_match_cancelled(create_test_cancelled_event())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_mock_publisher_expectations() {
        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish_match_cancelled()
            .times(1)
            .returning(|_| Ok(()));

        let publisher: Arc<dyn EventPublisher> = Arc::new(publisher);
        publisher
            .publish_match_cancelled(create_test_cancelled_event())
            .await
            .unwrap();
    }
}
