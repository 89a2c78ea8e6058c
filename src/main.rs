use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use notification_delivery::config::Settings;
use notification_delivery::server::{create_app, AppState};
use notification_delivery::shutdown::{shutdown_signal, GracefulShutdown, ShutdownConfig};
use notification_delivery::tasks::JobCleanupTask;
use notification_delivery::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new().context("Failed to load configuration")?;

    // Initialize tracing
    init_telemetry(&settings.logging)?;
    tracing::info!("Configuration loaded");

    // Create application state (starts the delivery queue)
    let state = AppState::from_settings(settings.clone())?;
    tracing::info!(
        max_attempts = settings.delivery.max_attempts,
        request_timeout_ms = settings.delivery.request_timeout_ms,
        workers = settings.queue.workers,
        "Application state initialized"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start job cleanup task in background
    let cleanup_task = JobCleanupTask::new(
        settings.queue.clone(),
        state.queue.registry().clone(),
        shutdown_tx.subscribe(),
    );
    let cleanup_handle = tokio::spawn(cleanup_task.run());

    // Create Axum app
    let app = create_app(state.clone());

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain the delivery queue and stop background tasks
    let shutdown = GracefulShutdown::new(
        state.queue.clone(),
        shutdown_tx,
        ShutdownConfig::from(&settings.queue),
    );
    shutdown.execute("server stopped").await;

    let _ = cleanup_handle.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}
