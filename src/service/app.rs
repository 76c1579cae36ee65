//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the rating
//! policy, repository, publisher, matchmaking service, rating period clock
//! and health server together and owns their background tasks.

use crate::amqp::{
    AmqpConfig, AmqpConnection, AmqpEventPublisher, EventPublisher, LoggingEventPublisher,
    PublisherConfig,
};
use crate::config::AppConfig;
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector};
use crate::rating::{build_policy, InMemoryParticipantRepository, ParticipantRepository};
use crate::service::health::{HealthCheck, HealthStatus, ServiceHandle};
use crate::service::matchmaking::MatchmakingService;
use crate::service::rating_period::RatingPeriodClock;
use crate::utils::current_timestamp;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// How often the health gauges are refreshed
const HEALTH_METRICS_INTERVAL: Duration = Duration::from_secs(30);

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    /// Queue, matchmaker and match lifecycle
    service: MatchmakingService,

    /// Background rating period closer
    clock: Arc<RatingPeriodClock>,

    repository: Arc<dyn ParticipantRepository>,

    metrics_collector: Arc<MetricsCollector>,

    health_server: Arc<HealthServer>,

    /// None when events are only logged
    amqp_connection: Option<Arc<AmqpConnection>>,

    background_tasks: Vec<JoinHandle<()>>,

    shutdown_tx: broadcast::Sender<()>,

    is_running: Arc<AtomicBool>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing ranked ladder service");
        info!(
            "Configuration: service={}, policy={:?}, amqp_enabled={}",
            config.service.name, config.rating.policy, config.amqp.enabled
        );

        let metrics_collector = Self::initialize_metrics()?;

        let (publisher, amqp_connection): (Arc<dyn EventPublisher>, _) = if config.amqp.enabled {
            let connection = Self::initialize_amqp(&config).await?;
            let publisher =
                Self::initialize_publisher(&config, &connection, metrics_collector.clone()).await?;
            (publisher, Some(connection))
        } else {
            info!("AMQP disabled, ladder events will only be logged");
            (Arc::new(LoggingEventPublisher), None)
        };

        Ok(Self::assemble(
            config,
            Arc::new(InMemoryParticipantRepository::new()),
            publisher,
            metrics_collector,
            amqp_connection,
        ))
    }

    /// Build the application around a caller-supplied repository and publisher.
    /// No broker connection is made.
    pub fn with_components(
        config: AppConfig,
        repository: Arc<dyn ParticipantRepository>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Self, ServiceError> {
        let metrics_collector = Self::initialize_metrics()?;
        Ok(Self::assemble(
            config,
            repository,
            publisher,
            metrics_collector,
            None,
        ))
    }

    fn assemble(
        config: AppConfig,
        repository: Arc<dyn ParticipantRepository>,
        publisher: Arc<dyn EventPublisher>,
        metrics_collector: Arc<MetricsCollector>,
        amqp_connection: Option<Arc<AmqpConnection>>,
    ) -> Self {
        let policy = build_policy(&config.rating);

        let service = MatchmakingService::new(
            config.matchmaking.clone(),
            policy.clone(),
            repository.clone(),
            publisher.clone(),
            metrics_collector.clone(),
        );

        let clock = Arc::new(RatingPeriodClock::new(
            repository.clone(),
            policy,
            config.rating.rating_period(),
            config.matchmaking.repository_timeout(),
            publisher,
            metrics_collector.clone(),
        ));

        let is_running = Arc::new(AtomicBool::new(false));
        let handle = ServiceHandle {
            name: config.service.name.clone(),
            service: service.clone(),
            running: is_running.clone(),
            amqp_connection: amqp_connection.clone(),
        };
        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: "0.0.0.0".to_string(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone()).with_service(handle),
        );

        let (shutdown_tx, _) = broadcast::channel(4);

        Self {
            config,
            service,
            clock,
            repository,
            metrics_collector,
            health_server,
            amqp_connection,
            background_tasks: Vec::new(),
            shutdown_tx,
            is_running,
        }
    }

    /// Close overdue rating periods, then start the background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting ranked ladder service");

        self.is_running.store(true, Ordering::SeqCst);

        match self.clock.catch_up(current_timestamp()).await {
            Ok(Some(closed)) => info!(
                "Caught up rating periods; current period started {}",
                closed.period_start
            ),
            Ok(None) => debug!("No rating period to close at startup"),
            Err(e) => warn!("Rating period catch-up failed at startup: {}", e),
        }

        let clock_task = self.clock.clone().spawn(self.shutdown_tx.subscribe());
        self.background_tasks.push(clock_task);

        self.start_health_server();
        self.start_health_metrics_task();

        info!("Ranked ladder service started");
        Ok(())
    }

    /// Stop scheduling, stop the background tasks and close the broker connection
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of ranked ladder service");

        self.is_running.store(false, Ordering::SeqCst);
        self.service.shutdown().await;

        if self.shutdown_tx.send(()).is_err() {
            debug!("No background task was listening for shutdown");
        }
        self.health_server.stop();

        let timeout = self.config.shutdown_timeout();
        for task in self.background_tasks.drain(..) {
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Background task ended abnormally: {}", e),
                Err(_) => warn!("Background task did not stop within {:?}", timeout),
            }
        }

        if let Some(connection) = &self.amqp_connection {
            if let Err(e) = connection.close().await {
                warn!("Failed to close AMQP connection: {}", e);
            }
        }

        let final_stats = self.service.get_stats().await;
        info!("Final service statistics: {:?}", final_stats);
        info!("Ranked ladder service shutdown completed");
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn service(&self) -> &MatchmakingService {
        &self.service
    }

    pub fn clock(&self) -> Arc<RatingPeriodClock> {
        self.clock.clone()
    }

    pub fn repository(&self) -> Arc<dyn ParticipantRepository> {
        self.repository.clone()
    }

    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// What the health probes inspect
    pub fn service_handle(&self) -> ServiceHandle {
        ServiceHandle {
            name: self.config.service.name.clone(),
            service: self.service.clone(),
            running: self.is_running.clone(),
            amqp_connection: self.amqp_connection.clone(),
        }
    }

    fn initialize_metrics() -> Result<Arc<MetricsCollector>, ServiceError> {
        MetricsCollector::new()
            .map(Arc::new)
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            })
    }

    async fn initialize_amqp(config: &AppConfig) -> Result<Arc<AmqpConnection>, ServiceError> {
        let amqp_config = AmqpConfig::from_settings(&config.amqp);
        info!(
            "Connecting to AMQP broker at {}:{}",
            amqp_config.host, amqp_config.port
        );

        AmqpConnection::new(amqp_config)
            .await
            .map(Arc::new)
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to connect to AMQP: {}", e),
            })
    }

    async fn initialize_publisher(
        config: &AppConfig,
        connection: &AmqpConnection,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<Arc<dyn EventPublisher>, ServiceError> {
        let channel = connection
            .connection()
            .open_channel(None)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open AMQP channel: {}", e),
            })?;

        let publisher_config = PublisherConfig {
            exchange_name: config.amqp.exchange_name.clone(),
            max_retries: config.amqp.max_retry_attempts,
            retry_delay_ms: config.amqp.retry_delay_ms,
            ..PublisherConfig::default()
        };
        let publisher = AmqpEventPublisher::new(channel, publisher_config)
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to initialize event publisher: {}", e),
            })?
            .with_metrics(metrics_collector);

        Ok(Arc::new(publisher))
    }

    fn start_health_server(&mut self) {
        let health_server = self.health_server.clone();
        let port = self.config.service.health_port;

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let task = tokio::spawn(async move {
            tokio::select! {
                result = health_server.start() => {
                    if let Err(e) = result {
                        error!("Health server failed: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => debug!("Health server task stopped"),
            }
        });
        self.background_tasks.push(task);
        info!("Health endpoints starting on port {}", port);
    }

    /// Refresh the uptime and health gauges until shutdown
    fn start_health_metrics_task(&mut self) {
        let handle = self.service_handle();
        let metrics_collector = self.metrics_collector.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_METRICS_INTERVAL);
            let start_time = tokio::time::Instant::now();

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown_rx.recv() => break,
                }

                metrics_collector
                    .service()
                    .uptime_seconds
                    .set(start_time.elapsed().as_secs() as i64);

                match HealthCheck::check(&handle).await {
                    Ok(health) => {
                        metrics_collector.update_health_status(health.status.as_gauge());
                        for check in &health.checks {
                            metrics_collector.update_component_health(
                                &check.name,
                                check.status != HealthStatus::Unhealthy,
                            );
                        }
                        debug!(
                            "Health: {} - {} waiting, {} active matches",
                            health.status, health.stats.queue_length, health.stats.active_matches
                        );
                    }
                    Err(e) => warn!("Health check failed: {}", e),
                }
            }
            debug!("Health metrics task stopped");
        });
        self.background_tasks.push(task);
    }
}
