//! Graceful shutdown handling for the delivery service.
//!
//! Shutdown runs in two phases:
//! 1. Stop accepting jobs and drain the delivery queue, cancelling whatever
//!    is still retrying once the drain timeout expires
//! 2. Signal background tasks to stop

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::broadcast;

use crate::config::QueueConfig;
use crate::queue::DeliveryQueue;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time running deliveries get before they are cancelled (default: 30 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&QueueConfig> for ShutdownConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            drain_timeout: Duration::from_secs(config.drain_timeout_seconds),
        }
    }
}

/// Result of a shutdown sequence
#[derive(Debug, Clone, Default)]
pub struct ShutdownResult {
    /// Jobs that reached a terminal state during the drain, including cancelled ones
    pub jobs_finished: usize,
    pub duration: Duration,
}

/// Handles graceful shutdown of the delivery service
pub struct GracefulShutdown {
    queue: Arc<DeliveryQueue>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(
        queue: Arc<DeliveryQueue>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            queue,
            shutdown_tx,
            config,
        }
    }

    /// Execute graceful shutdown sequence
    #[tracing::instrument(name = "graceful_shutdown", skip(self))]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let before = self.queue.stats().jobs;
        let pending = before.queued + before.running;

        tracing::info!(
            reason = %reason,
            pending_jobs = pending,
            "Starting graceful shutdown - Phase 1: Draining delivery queue"
        );
        self.queue.shutdown(self.config.drain_timeout).await;

        let after = self.queue.stats().jobs;
        let still_pending = after.queued + after.running;

        tracing::info!("Phase 2: Signaling background tasks to stop");
        let _ = self.shutdown_tx.send(());

        let result = ShutdownResult {
            jobs_finished: pending.saturating_sub(still_pending),
            duration: start.elapsed(),
        };

        tracing::info!(
            jobs_finished = result.jobs_finished,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
