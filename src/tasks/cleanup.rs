use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::QueueConfig;
use crate::metrics::QueueMetrics;
use crate::queue::JobRegistry;

/// Background task removing finished job records past their retention
pub struct JobCleanupTask {
    config: QueueConfig,
    registry: Arc<JobRegistry>,
    shutdown: broadcast::Receiver<()>,
}

impl JobCleanupTask {
    pub fn new(
        config: QueueConfig,
        registry: Arc<JobRegistry>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            registry,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let ttl = Duration::from_secs(self.config.result_ttl_seconds);
        let mut cleanup_timer =
            tokio::time::interval(Duration::from_secs(self.config.cleanup_interval_seconds.max(1)));

        // Skip immediate first tick
        cleanup_timer.tick().await;

        tracing::info!(
            cleanup_interval_secs = self.config.cleanup_interval_seconds,
            result_ttl_secs = self.config.result_ttl_seconds,
            "Job cleanup task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Job cleanup task received shutdown signal");
                    break;
                }
                _ = cleanup_timer.tick() => {
                    self.cleanup(ttl);
                }
            }
        }

        tracing::info!("Job cleanup task stopped");
    }

    fn cleanup(&self, ttl: Duration) {
        let removed = self.registry.cleanup_expired(ttl);
        if removed > 0 {
            QueueMetrics::record_expired(removed as u64);
            tracing::info!(
                removed,
                remaining = self.registry.len(),
                "Expired job records cleaned up"
            );
        }
    }
}
