//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the ranked ladder: queue
//! traffic, match lifecycle, rating updates and service health.

use crate::queue::PassStop;
use crate::types::{BracketChange, MatchRatingUpdate};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the ladder service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue metrics
    queue_metrics: QueueMetrics,

    /// Match lifecycle metrics
    match_metrics: MatchMetrics,

    /// Rating engine metrics
    rating_metrics: RatingMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages published
    pub amqp_messages_total: IntCounterVec,

    /// AMQP publish errors
    pub amqp_errors_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Queue metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Join attempts by result
    pub join_requests_total: IntCounterVec,

    /// Entries removed by leave requests
    pub players_left_total: IntCounter,

    /// Participants currently waiting
    pub players_waiting: IntGauge,

    /// Time from enqueue to pairing
    pub queue_wait_time_seconds: Histogram,

    /// Entries dropped because their character was unregistered
    pub entries_purged_total: IntCounter,
}

/// Match lifecycle metrics
#[derive(Clone)]
pub struct MatchMetrics {
    pub matches_created_total: IntCounter,

    pub active_matches: IntGauge,

    /// Reports by outcome (ok or error kind)
    pub matches_reported_total: IntCounterVec,

    pub matches_cancelled_total: IntCounter,

    /// Matchmaking passes by stop reason
    pub matchmaking_passes_total: IntCounterVec,

    pub matchmaking_pass_duration: Histogram,
}

/// Rating engine metrics
#[derive(Clone)]
pub struct RatingMetrics {
    pub rating_update_duration: Histogram,

    /// Ratings after each update
    pub rating_distribution: Histogram,

    /// Bracket or tier movements by direction
    pub bracket_changes_total: IntCounterVec,

    pub rating_periods_closed_total: IntCounter,

    pub records_inflated_total: IntCounter,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let match_metrics = MatchMetrics::new(&registry)?;
        let rating_metrics = RatingMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            match_metrics,
            rating_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn matches(&self) -> &MatchMetrics {
        &self.match_metrics
    }

    pub fn rating(&self) -> &RatingMetrics {
        &self.rating_metrics
    }

    /// Record a join attempt; `result` is "ok" or an error kind
    pub fn record_join(&self, result: &str, queue_length: usize) {
        self.queue_metrics
            .join_requests_total
            .with_label_values(&[result])
            .inc();
        self.queue_metrics.players_waiting.set(queue_length as i64);
    }

    pub fn record_leave(&self, removed: usize, queue_length: usize) {
        self.queue_metrics.players_left_total.inc_by(removed as u64);
        self.queue_metrics.players_waiting.set(queue_length as i64);
    }

    pub fn record_purged(&self, count: usize) {
        self.queue_metrics.entries_purged_total.inc_by(count as u64);
    }

    /// Record a completed matchmaking pass
    pub fn record_pass(&self, stop: PassStop, duration: Duration, queue_length: usize) {
        let label = match stop {
            PassStop::MatchCapReached => "match_cap",
            PassStop::TooFewEntries => "too_few_entries",
            PassStop::Exhausted => "exhausted",
        };
        self.match_metrics
            .matchmaking_passes_total
            .with_label_values(&[label])
            .inc();
        self.match_metrics
            .matchmaking_pass_duration
            .observe(duration.as_secs_f64());
        self.queue_metrics.players_waiting.set(queue_length as i64);
    }

    /// Record a match being created after `waited` in the queue
    pub fn record_match_created(&self, waited: [Duration; 2], active: usize) {
        self.match_metrics.matches_created_total.inc();
        self.match_metrics.active_matches.set(active as i64);
        for wait in waited {
            self.queue_metrics
                .queue_wait_time_seconds
                .observe(wait.as_secs_f64());
        }
    }

    /// Record a report attempt; `outcome` is "ok" or an error kind
    pub fn record_report(&self, outcome: &str, active: usize) {
        self.match_metrics
            .matches_reported_total
            .with_label_values(&[outcome])
            .inc();
        self.match_metrics.active_matches.set(active as i64);
    }

    pub fn record_cancelled(&self, active: usize) {
        self.match_metrics.matches_cancelled_total.inc();
        self.match_metrics.active_matches.set(active as i64);
    }

    /// Record an applied rating update
    pub fn record_rating_update(&self, update: &MatchRatingUpdate, duration: Duration) {
        self.rating_metrics
            .rating_update_duration
            .observe(duration.as_secs_f64());
        for delta in [&update.winner, &update.loser] {
            self.rating_metrics
                .rating_distribution
                .observe(delta.after.rating);
            let label = match delta.bracket_change {
                BracketChange::Promoted => "promoted",
                BracketChange::Demoted => "demoted",
                BracketChange::Unchanged => continue,
            };
            self.rating_metrics
                .bracket_changes_total
                .with_label_values(&[label])
                .inc();
        }
    }

    pub fn record_rating_period_closed(&self, records_inflated: usize) {
        self.rating_metrics.rating_periods_closed_total.inc();
        self.rating_metrics
            .records_inflated_total
            .inc_by(records_inflated as u64);
    }

    /// Record AMQP operation
    pub fn record_amqp_operation(&self, operation: &str, success: bool) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[operation, status])
            .inc();

        if !success {
            self.service_metrics
                .amqp_errors_total
                .with_label_values(&[operation])
                .inc();
        }
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("ranked_ladder_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "ranked_ladder_amqp_messages_total",
                "Total AMQP messages published",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let amqp_errors_total = IntCounterVec::new(
            Opts::new("ranked_ladder_amqp_errors_total", "Total AMQP errors"),
            &["operation"],
        )?;
        registry.register(Box::new(amqp_errors_total.clone()))?;

        let health_status = IntGauge::new(
            "ranked_ladder_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("ranked_ladder_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            amqp_errors_total,
            health_status,
            component_health,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let join_requests_total = IntCounterVec::new(
            Opts::new("ranked_ladder_join_requests_total", "Queue join attempts"),
            &["result"],
        )?;
        registry.register(Box::new(join_requests_total.clone()))?;

        let players_left_total = IntCounter::new(
            "ranked_ladder_players_left_total",
            "Queue entries removed by leave requests",
        )?;
        registry.register(Box::new(players_left_total.clone()))?;

        let players_waiting = IntGauge::new(
            "ranked_ladder_players_waiting",
            "Participants currently waiting in queue",
        )?;
        registry.register(Box::new(players_waiting.clone()))?;

        let queue_wait_time_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "ranked_ladder_queue_wait_time_seconds",
                "Time from enqueue to pairing",
            )
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        )?;
        registry.register(Box::new(queue_wait_time_seconds.clone()))?;

        let entries_purged_total = IntCounter::new(
            "ranked_ladder_entries_purged_total",
            "Queue entries dropped for unregistered characters",
        )?;
        registry.register(Box::new(entries_purged_total.clone()))?;

        Ok(Self {
            join_requests_total,
            players_left_total,
            players_waiting,
            queue_wait_time_seconds,
            entries_purged_total,
        })
    }
}

impl MatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let matches_created_total =
            IntCounter::new("ranked_ladder_matches_created_total", "Total matches created")?;
        registry.register(Box::new(matches_created_total.clone()))?;

        let active_matches =
            IntGauge::new("ranked_ladder_active_matches", "Matches awaiting a result")?;
        registry.register(Box::new(active_matches.clone()))?;

        let matches_reported_total = IntCounterVec::new(
            Opts::new("ranked_ladder_matches_reported_total", "Match reports"),
            &["outcome"],
        )?;
        registry.register(Box::new(matches_reported_total.clone()))?;

        let matches_cancelled_total = IntCounter::new(
            "ranked_ladder_matches_cancelled_total",
            "Matches closed without a result",
        )?;
        registry.register(Box::new(matches_cancelled_total.clone()))?;

        let matchmaking_passes_total = IntCounterVec::new(
            Opts::new("ranked_ladder_matchmaking_passes_total", "Matchmaking passes"),
            &["stop"],
        )?;
        registry.register(Box::new(matchmaking_passes_total.clone()))?;

        let matchmaking_pass_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ranked_ladder_matchmaking_pass_duration_seconds",
                "Time spent holding the queue lock for one pass",
            )
            .buckets(vec![0.0001, 0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(matchmaking_pass_duration.clone()))?;

        Ok(Self {
            matches_created_total,
            active_matches,
            matches_reported_total,
            matches_cancelled_total,
            matchmaking_passes_total,
            matchmaking_pass_duration,
        })
    }
}

impl RatingMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let rating_update_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ranked_ladder_rating_update_duration_seconds",
                "Time to apply and persist one result",
            )
            .buckets(vec![0.0001, 0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(rating_update_duration.clone()))?;

        let rating_distribution = Histogram::with_opts(
            HistogramOpts::new(
                "ranked_ladder_rating_distribution",
                "Participant ratings after updates",
            )
            .buckets(vec![
                800.0, 1000.0, 1100.0, 1250.0, 1400.0, 1500.0, 1600.0, 1800.0, 2000.0, 2400.0,
            ]),
        )?;
        registry.register(Box::new(rating_distribution.clone()))?;

        let bracket_changes_total = IntCounterVec::new(
            Opts::new(
                "ranked_ladder_bracket_changes_total",
                "Promotions and demotions",
            ),
            &["direction"],
        )?;
        registry.register(Box::new(bracket_changes_total.clone()))?;

        let rating_periods_closed_total = IntCounter::new(
            "ranked_ladder_rating_periods_closed_total",
            "Rating periods closed",
        )?;
        registry.register(Box::new(rating_periods_closed_total.clone()))?;

        let records_inflated_total = IntCounter::new(
            "ranked_ladder_records_inflated_total",
            "Idle rating records whose deviation was inflated",
        )?;
        registry.register(Box::new(records_inflated_total.clone()))?;

        Ok(Self {
            rating_update_duration,
            rating_distribution,
            bracket_changes_total,
            rating_periods_closed_total,
            records_inflated_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().unwrap();
        let families = collector.registry().gather();
        assert!(!families.is_empty());
    }

    #[test]
    fn test_record_join_and_pass() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_join("ok", 2);
        collector.record_join("already_queued", 2);
        collector.record_pass(PassStop::TooFewEntries, Duration::from_millis(2), 0);

        assert_eq!(
            collector
                .queue()
                .join_requests_total
                .with_label_values(&["ok"])
                .get(),
            1
        );
        assert_eq!(collector.queue().players_waiting.get(), 0);
        assert_eq!(
            collector
                .matches()
                .matchmaking_passes_total
                .with_label_values(&["too_few_entries"])
                .get(),
            1
        );
    }

    #[test]
    fn test_separate_registries_do_not_collide() {
        // Each service instance owns its registry
        assert!(MetricsCollector::new().is_ok());
        assert!(MetricsCollector::new().is_ok());
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().unwrap();
        let timer = collector.start_timer();
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.stop() >= Duration::from_millis(5));
    }
}
