//! Main entry point for the Ranked Ladder service
//!
//! This is the production entry point that initializes and runs the
//! matchmaking queue and rating service with logging, health endpoints and
//! graceful shutdown.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use ranked_ladder::config::{validate_config, AppConfig};
use ranked_ladder::service::AppState;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Ranked Ladder - 1v1 matchmaking queue with Glicko-2 ratings
#[derive(Parser)]
#[command(
    name = "ranked-ladder",
    version,
    about = "A 1v1 ranked matchmaking queue and Glicko-2 rating service",
    long_about = "Ranked Ladder pairs registered characters for 1v1 matches, avoiding \
                 recent opponents, and keeps a Glicko-2 (or legacy tier) rating for each \
                 character. Match events are published over AMQP."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Query the health endpoint of a running instance and exit
    #[arg(long, help = "Perform a health check and exit with status code")]
    health_check: bool,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Health port override
    #[arg(long, value_name = "PORT", help = "Override health server port")]
    health_port: Option<u16>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Ask a running instance for `/ready` on the local health port
async fn perform_health_check(config: &AppConfig) -> Result<bool> {
    let addr = format!("127.0.0.1:{}", config.service.health_port);
    info!("Performing health check against {}", addr);

    let probe = async {
        let mut stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("Failed to connect to {}", addr))?;
        stream
            .write_all(b"GET /ready HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await?;

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;
        let response = String::from_utf8_lossy(&response);
        let status_line = response.lines().next().unwrap_or_default().to_string();
        Ok::<_, anyhow::Error>(status_line)
    };

    let status_line = tokio::time::timeout(Duration::from_secs(5), probe)
        .await
        .context("Health check timed out")??;

    println!("Health Check: {}", status_line);
    Ok(status_line.split_whitespace().nth(1) == Some("200"))
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        sigterm.recv().await;
        Ok::<_, anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received SIGINT (Ctrl+C) signal");
        },
        result = terminate => {
            result?;
            info!("Received SIGTERM signal");
        },
    }
    Ok(())
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("Ranked Ladder Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Health port: {}", config.service.health_port);
    if config.amqp.enabled {
        info!("   AMQP: {} (exchange {})", config.amqp.url, config.amqp.exchange_name);
    } else {
        info!("   AMQP: disabled");
    }
    info!("   Rating policy: {:?}", config.rating.policy);
    info!("   Rating period: {} days", config.rating.rating_period_days);
    info!(
        "   Max active matches: {}",
        config.matchmaking.max_active_matches
    );
    info!(
        "   Matchmaking delay: {}ms",
        config.matchmaking.matchmaking_delay_ms
    );
}

/// Load configuration from file or environment, then apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(config_path) => AppConfig::from_file(config_path)?,
        None => AppConfig::from_env()?,
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(health_port) = args.health_port {
        config.service.health_port = health_port;
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.health_check {
        let healthy = match perform_health_check(&config).await {
            Ok(healthy) => healthy,
            Err(e) => {
                error!("Health check failed: {:#}", e);
                false
            }
        };
        std::process::exit(if healthy { 0 } else { 1 });
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    info!("Initializing service components...");
    let mut app_state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("Ranked Ladder service is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    if let Err(e) = wait_for_shutdown_signal().await {
        warn!("Signal handling failed, shutting down: {}", e);
    }

    info!("Shutdown signal received, beginning graceful shutdown...");
    let shutdown_timeout = config.shutdown_timeout();
    match tokio::time::timeout(shutdown_timeout, app_state.shutdown()).await {
        Ok(Ok(())) => info!("Graceful shutdown completed successfully"),
        Ok(Err(e)) => error!("Shutdown failed: {}", e),
        Err(_) => warn!("Shutdown timeout exceeded, forcing exit"),
    }

    info!("Ranked Ladder service stopped");
    Ok(())
}
