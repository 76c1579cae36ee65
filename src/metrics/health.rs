//! Health check endpoints and Prometheus metrics server
//!
//! This module provides HTTP endpoints for health checks, Prometheus metrics
//! and a read-only view of the queue for the ranked ladder using Axum.

use crate::metrics::collector::MetricsCollector;
use crate::service::health::{HealthCheck, HealthStatus, ServiceHandle};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const SERVICE_NAME: &str = "ranked-ladder";

/// Health server configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    /// Port to bind the health server to
    pub port: u16,
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for the health server
#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    pub service: Option<ServiceHandle>,
}

/// Health server that provides HTTP endpoints for monitoring
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                service: None,
            },
            shutdown_tx,
        }
    }

    /// Attach the service the probes report on
    pub fn with_service(mut self, service: ServiceHandle) -> Self {
        self.state.service = Some(service);
        self
    }

    pub fn config(&self) -> &HealthServerConfig {
        &self.config
    }

    /// Serve until `stop` is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid health server address")?;

        let app = self.create_router();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind health server to {}", addr))?;

        info!("Health server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Health server shutdown signal received");
            })
            .await?;

        info!("Health server stopped");
        Ok(())
    }

    fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/alive", get(alive_handler))
            .route("/metrics", get(metrics_handler))
            .route("/stats", get(stats_handler))
            .route("/queue", get(queue_handler))
            .with_state(self.state.clone())
    }

    pub fn stop(&self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to health server: {}", e);
        }
    }
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/ready", "/alive", "/metrics", "/stats", "/queue"]
    }))
}

fn not_initialized() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "status": "unhealthy",
            "service": SERVICE_NAME,
            "error": "Service not initialized"
        })),
    )
        .into_response()
}

/// Lightweight health check
async fn health_handler(State(state): State<HealthServerState>) -> Response {
    debug!("Health check requested");

    let Some(service) = &state.service else {
        return not_initialized();
    };
    let status = HealthCheck::liveness_check(service)
        .await
        .unwrap_or(HealthStatus::Unhealthy);
    let code = match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    (
        code,
        Json(json!({
            "status": status,
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

/// Probe body shared by `/ready` and `/alive`. `accept_degraded` decides
/// whether a degraded ladder still answers 200.
fn probe_response(
    probe: &str,
    result: Result<HealthStatus>,
    accept_degraded: bool,
) -> Response {
    let status = result.unwrap_or_else(|e| {
        error!("{} probe failed: {}", probe, e);
        HealthStatus::Unhealthy
    });
    let code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded if accept_degraded => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(json!({ "probe": probe, "status": status }))).into_response()
}

/// Ready while the queue answers; a closed queue still counts as ready
async fn ready_handler(State(state): State<HealthServerState>) -> Response {
    debug!("Readiness check requested");
    let Some(service) = &state.service else {
        return not_initialized();
    };
    probe_response("ready", HealthCheck::readiness_check(service).await, true)
}

async fn alive_handler(State(state): State<HealthServerState>) -> Response {
    let Some(service) = &state.service else {
        return not_initialized();
    };
    probe_response("alive", HealthCheck::liveness_check(service).await, false)
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<HealthServerState>) -> Response {
    let metric_families = state.metrics_collector.registry().gather();
    let encoder = TextEncoder::new();

    match encoder.encode_to_string(&metric_families) {
        Ok(output) => {
            debug!("Serving {} metric families", metric_families.len());
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, encoder.format_type().to_string())],
                output,
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
                .into_response()
        }
    }
}

/// Detailed service statistics (for debugging/human consumption)
async fn stats_handler(State(state): State<HealthServerState>) -> Response {
    let Some(service) = &state.service else {
        return not_initialized();
    };

    match HealthCheck::check(service).await {
        Ok(health) => (
            StatusCode::OK,
            Json(json!({
                "service": {
                    "name": health.service,
                    "version": health.version,
                    "status": health.status,
                },
                "queue": {
                    "open": health.stats.queue_open,
                    "length": health.stats.queue_length,
                    "timer_pending": health.stats.timer_pending,
                    "players_queued": health.stats.players_queued,
                    "passes_run": health.stats.passes_run,
                },
                "matches": {
                    "active": health.stats.active_matches,
                    "max_active": health.stats.max_active_matches,
                    "users_in_match": health.stats.users_in_match,
                    "created": health.stats.matches_created,
                    "reported": health.stats.matches_reported,
                    "cancelled": health.stats.matches_cancelled,
                },
                "components": health.checks,
                "timestamp": health.timestamp
            })),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to get stats: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "service": { "name": SERVICE_NAME, "status": "error" },
                    "error": "Failed to get service stats",
                })),
            )
                .into_response()
        }
    }
}

/// Read-only snapshot of the waiting queue in arrival order
async fn queue_handler(State(state): State<HealthServerState>) -> Response {
    let Some(service) = &state.service else {
        return not_initialized();
    };

    let entries = service.service.view_queue().await;
    (
        StatusCode::OK,
        Json(json!({
            "length": entries.len(),
            "entries": entries,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::LoggingEventPublisher;
    use crate::config::{MatchmakingSettings, RatingSettings};
    use crate::rating::{build_policy, InMemoryParticipantRepository};
    use crate::service::matchmaking::MatchmakingService;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt; // for oneshot

    fn create_test_server(with_service: bool) -> (HealthServer, Option<MatchmakingService>) {
        let collector = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
        let server = HealthServer::new(HealthServerConfig::default(), collector.clone());
        if !with_service {
            return (server, None);
        }

        let service = MatchmakingService::new(
            MatchmakingSettings::default(),
            build_policy(&RatingSettings::default()),
            Arc::new(InMemoryParticipantRepository::new()),
            Arc::new(LoggingEventPublisher),
            collector,
        );
        let handle = ServiceHandle {
            name: SERVICE_NAME.to_string(),
            service: service.clone(),
            running: Arc::new(AtomicBool::new(true)),
            amqp_connection: None,
        };
        (server.with_service(handle), Some(service))
    }

    async fn get(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_root_endpoint() {
        let (server, _) = create_test_server(false);
        let response = get(server.create_router(), "/").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (server, _) = create_test_server(false);
        server.state.metrics_collector.record_join("ok", 1);

        let response = get(server.create_router(), "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("ranked_ladder_join_requests_total"));
    }

    #[tokio::test]
    async fn test_endpoints_without_service() {
        let (server, _) = create_test_server(false);
        let app = server.create_router();

        for uri in ["/health", "/ready", "/alive", "/stats", "/queue"] {
            let response = get(app.clone(), uri).await;
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_endpoints_with_service() {
        let (server, _) = create_test_server(true);
        let app = server.create_router();

        for uri in ["/health", "/ready", "/alive", "/stats"] {
            let response = get(app.clone(), uri).await;
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_closed_queue_is_ready_but_degraded() {
        let (server, service) = create_test_server(true);
        service.unwrap().set_queue_open(false).await;

        let response = get(server.create_router(), "/ready").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "degraded");
    }

    #[tokio::test]
    async fn test_stopped_service_is_not_alive() {
        let (server, _) = create_test_server(true);
        if let Some(handle) = &server.state.service {
            handle.running.store(false, std::sync::atomic::Ordering::SeqCst);
        }

        for uri in ["/alive", "/ready"] {
            let response = get(server.create_router(), uri).await;
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_queue_endpoint_lists_waiting_entries() {
        let (server, service) = create_test_server(true);
        let service = service.unwrap();
        service.register_character(7, "ryu").await.unwrap();
        service.join_queue(7, "ryu").await.unwrap();

        let response = get(server.create_router(), "/queue").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["length"], 1);
        assert_eq!(value["entries"][0]["position"], 1);
        assert_eq!(value["entries"][0]["participant"]["character"], "ryu");
    }

    #[tokio::test]
    async fn test_404_handling() {
        let (server, _) = create_test_server(false);
        let response = get(server.create_router(), "/nonexistent").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_health_server_config() {
        let config = HealthServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
    }
}
