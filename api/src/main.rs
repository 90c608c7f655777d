use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;

mod handlers;
mod routes;
mod state;

use common::client::{LegacyClient, RestClient};
use common::config::Settings;
use common::db::{DbPool, JobDefinitionRepository, PgTabularStore};
use common::executor::{ExecutorConfig, JobExecutor};
use common::scheduler::{SchedulerConfig, TriggerScheduler};
use common::telemetry;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Settings::load().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(
        &config.observability.log_level,
        config.observability.json_logs,
    )?;
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        "Configuration loaded"
    );

    let metrics_handle = telemetry::init_metrics()?;

    // Initialize database connection pool
    let db_pool = DbPool::new(&config.database).await?;
    tracing::info!("Database connection pool established");

    if config.database.run_migrations {
        db_pool.run_migrations().await?;
    } else {
        tracing::info!("Database migrations skipped (disabled in configuration)");
    }

    let rest_client = RestClient::new(&config.http)?;
    let legacy_client = LegacyClient::new(&config.http)?;

    let executor = Arc::new(JobExecutor::new(
        Arc::new(PgTabularStore::new(db_pool.clone())),
        Arc::new(rest_client.clone()),
        ExecutorConfig::from(&config.executor),
    ));
    let scheduler = Arc::new(TriggerScheduler::new(
        Arc::new(JobDefinitionRepository::new(db_pool.clone())),
        executor,
        SchedulerConfig::from_settings(&config.scheduler, &config.executor)?,
    ));

    if config.scheduler.scan_on_startup {
        match scheduler.scan().await {
            Ok(report) => tracing::info!(
                scheduled = report.scheduled.len(),
                completed = report.completed.len(),
                skipped = report.skipped.len(),
                invalid = report.invalid.len(),
                "Startup scan finished"
            ),
            // keep serving; the failures are already logged per job
            Err(e) => tracing::error!(error = %e, "Startup scan reported failures"),
        }
    }

    // Create application state
    let state = AppState::new(config.clone(), scheduler.clone(), rest_client, legacy_client)
        .with_db_pool(db_pool.clone())
        .with_metrics(metrics_handle);

    // Create router
    let app = routes::create_router(state);

    // Start server
    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    tracing::info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    db_pool.close().await;
    tracing::info!("API server stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Initiating graceful shutdown");
}
