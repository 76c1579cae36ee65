//! Health check endpoints and monitoring
//!
//! This module provides health check functionality for the ranked ladder,
//! including readiness and liveness probes.

use crate::amqp::AmqpConnection;
use crate::service::matchmaking::MatchmakingService;
use crate::types::LadderStats;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// How long a probe may wait for the queue lock
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value used by the metrics collector
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn combine(self, other: &HealthStatus) -> HealthStatus {
        match (self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// What the probes look at
#[derive(Clone)]
pub struct ServiceHandle {
    pub name: String,
    pub service: MatchmakingService,
    pub running: Arc<AtomicBool>,
    /// None when event publishing to a broker is disabled
    pub amqp_connection: Option<Arc<AmqpConnection>>,
}

impl ServiceHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub stats: LadderStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(handle: &ServiceHandle) -> Result<Self> {
        let service_check = Self::check_service_running(handle);
        let (queue_check, stats) = Self::check_queue(handle).await;
        let amqp_check = Self::check_amqp_health(handle);

        // Lost events degrade the service but do not stop the ladder
        let amqp_status = match amqp_check.status {
            HealthStatus::Unhealthy => HealthStatus::Degraded,
            ref other => other.clone(),
        };
        let status = service_check
            .status
            .clone()
            .combine(&queue_check.status)
            .combine(&amqp_status);

        Ok(HealthCheck {
            status,
            service: handle.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks: vec![service_check, queue_check, amqp_check],
            stats: stats.unwrap_or_default(),
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(handle: &ServiceHandle) -> Result<HealthStatus> {
        if handle.is_running() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - running and the queue lock can be taken
    pub async fn readiness_check(handle: &ServiceHandle) -> Result<HealthStatus> {
        if !handle.is_running() {
            return Ok(HealthStatus::Unhealthy);
        }

        let (queue_check, _) = Self::check_queue(handle).await;
        Ok(queue_check.status)
    }

    fn check_service_running(handle: &ServiceHandle) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if handle.is_running() {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// The queue is healthy when its lock is obtainable and it is open
    async fn check_queue(handle: &ServiceHandle) -> (ComponentCheck, Option<LadderStats>) {
        let start = std::time::Instant::now();

        let (status, message, stats) =
            match tokio::time::timeout(PROBE_TIMEOUT, handle.service.get_stats()).await {
                Ok(stats) if stats.queue_open => (HealthStatus::Healthy, None, Some(stats)),
                Ok(stats) => (
                    HealthStatus::Degraded,
                    Some("Queue is closed".to_string()),
                    Some(stats),
                ),
                Err(_) => {
                    warn!("Queue lock not obtained within {:?}", PROBE_TIMEOUT);
                    (
                        HealthStatus::Unhealthy,
                        Some(format!("Queue lock busy for more than {:?}", PROBE_TIMEOUT)),
                        None,
                    )
                }
            };

        (
            ComponentCheck {
                name: "matchmaking_queue".to_string(),
                status,
                message,
                duration_ms: start.elapsed().as_millis() as u64,
            },
            stats,
        )
    }

    fn check_amqp_health(handle: &ServiceHandle) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match &handle.amqp_connection {
            Some(connection) if connection.is_open() => (HealthStatus::Healthy, None),
            Some(_) => (
                HealthStatus::Unhealthy,
                Some("AMQP connection closed".to_string()),
            ),
            None => (
                HealthStatus::Healthy,
                Some("Event publishing disabled".to_string()),
            ),
        };

        ComponentCheck {
            name: "amqp_connection".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}
