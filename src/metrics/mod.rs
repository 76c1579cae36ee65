//! Metrics and monitoring for the ranked ladder
//!
//! Prometheus metrics collection plus the HTTP server exposing health
//! probes, metrics and the queue snapshot.

pub mod collector;
pub mod health;

pub use collector::{
    MatchMetrics, MetricsCollector, MetricsTimer, QueueMetrics, RatingMetrics, ServiceMetrics,
};
pub use health::{HealthServer, HealthServerConfig, HealthServerState};
