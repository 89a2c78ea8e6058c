//! In-memory scheduling front door.
//!
//! Callers enqueue requests and get a job id back immediately; a dispatcher
//! task feeds them to the [`DeliveryEngine`] with bounded concurrency and
//! records each job's progress in a [`JobRegistry`] that can be queried
//! until the record expires.
//!
//! # Example
//!
//! ```rust,ignore
//! let queue = DeliveryQueue::start(engine, QueueConfig::default());
//!
//! let job_id = queue.enqueue(request)?;
//! let record = queue.status(&job_id);
//!
//! queue.shutdown(Duration::from_secs(30)).await;
//! ```

mod registry;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::delivery::{DeliveryEngine, SubmitOptions};
use crate::metrics::QueueMetrics;
use crate::notification::NotificationRequest;

pub use registry::{AttemptSummary, JobRecord, JobRegistry, JobStats, JobStatus, OutcomeSummary};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Delivery queue is full")]
    Full,

    #[error("Delivery queue is shutting down")]
    ShuttingDown,

    #[error("Job {0} is already queued or running")]
    Duplicate(Uuid),
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub capacity: usize,
    pub buffered: usize,
    pub workers: usize,
    pub accepting: bool,
    pub jobs: JobStats,
}

/// Bounded job queue in front of the delivery engine
pub struct DeliveryQueue {
    sender: mpsc::Sender<NotificationRequest>,
    registry: Arc<JobRegistry>,
    config: QueueConfig,
    /// Stops intake; buffered and running jobs continue
    closing: CancellationToken,
    /// Cancels running deliveries at their next attempt boundary
    abort: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryQueue {
    /// Create the queue and spawn its dispatcher on the current runtime
    pub fn start(engine: DeliveryEngine, config: QueueConfig) -> Arc<Self> {
        let capacity = config.capacity.max(1);
        let workers = config.workers.max(1);

        let (sender, receiver) = mpsc::channel(capacity);
        let registry = Arc::new(JobRegistry::new());
        let closing = CancellationToken::new();
        let abort = CancellationToken::new();

        let dispatcher = Dispatcher {
            receiver,
            engine,
            registry: registry.clone(),
            workers,
            closing: closing.clone(),
            abort: abort.clone(),
        };
        let handle = tokio::spawn(dispatcher.run());

        info!(capacity, workers, "Delivery queue started");

        Arc::new(Self {
            sender,
            registry,
            config,
            closing,
            abort,
            dispatcher: Mutex::new(Some(handle)),
        })
    }

    /// Queue a request for delivery, returning its job id
    #[tracing::instrument(
        name = "queue.enqueue",
        skip(self, request),
        fields(request_id = %request.id(), kind = %request.kind())
    )]
    pub fn enqueue(&self, request: NotificationRequest) -> Result<Uuid, QueueError> {
        if self.closing.is_cancelled() {
            QueueMetrics::record_rejected("shutting_down");
            return Err(QueueError::ShuttingDown);
        }

        let permit = match self.sender.try_reserve() {
            Ok(permit) => permit,
            Err(mpsc::error::TrySendError::Full(())) => {
                QueueMetrics::record_rejected("full");
                warn!("Delivery queue full, rejecting job");
                return Err(QueueError::Full);
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                QueueMetrics::record_rejected("shutting_down");
                return Err(QueueError::ShuttingDown);
            }
        };

        let id = request.id();
        if !self.registry.insert_queued(&request) {
            // The dropped permit hands its slot back
            QueueMetrics::record_rejected("duplicate");
            warn!("Job with this id is still pending, rejecting duplicate");
            return Err(QueueError::Duplicate(id));
        }

        permit.send(request);
        QueueMetrics::job_enqueued();
        debug!("Job queued");
        Ok(id)
    }

    pub fn status(&self, id: &Uuid) -> Option<JobRecord> {
        self.registry.get(id)
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn is_accepting(&self) -> bool {
        !self.closing.is_cancelled()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            capacity: self.sender.max_capacity(),
            buffered: self.sender.max_capacity() - self.sender.capacity(),
            workers: self.config.workers.max(1),
            accepting: self.is_accepting(),
            jobs: self.registry.stats(),
        }
    }

    /// Stop intake and wait for queued and running jobs.
    ///
    /// Jobs still running after `drain_timeout` are cancelled; they finish
    /// as `cancelled` at their next attempt boundary.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        self.closing.cancel();

        let Some(mut handle) = self.dispatcher.lock().await.take() else {
            return;
        };

        match tokio::time::timeout(drain_timeout, &mut handle).await {
            Ok(result) => {
                log_join_result(result);
                info!("Delivery queue drained");
            }
            Err(_) => {
                warn!(
                    timeout_ms = drain_timeout.as_millis() as u64,
                    "Drain timeout reached, cancelling in-flight deliveries"
                );
                self.abort.cancel();
                log_join_result(handle.await);
                info!("Delivery queue stopped");
            }
        }
    }
}

struct Dispatcher {
    receiver: mpsc::Receiver<NotificationRequest>,
    engine: DeliveryEngine,
    registry: Arc<JobRegistry>,
    workers: usize,
    closing: CancellationToken,
    abort: CancellationToken,
}

impl Dispatcher {
    async fn run(mut self) {
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = self.closing.cancelled() => {
                    self.receiver.close();
                    break;
                }

                Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_join_result(result);
                }

                job = self.receiver.recv() => {
                    match job {
                        Some(request) => self.spawn_job(&mut in_flight, request).await,
                        None => break,
                    }
                }
            }
        }

        // Intake is closed; run whatever was already buffered
        while let Some(request) = self.receiver.recv().await {
            self.spawn_job(&mut in_flight, request).await;
        }

        while let Some(result) = in_flight.join_next().await {
            log_join_result(result);
        }

        debug!("Dispatcher stopped");
    }

    async fn spawn_job(&self, in_flight: &mut JoinSet<()>, request: NotificationRequest) {
        while in_flight.len() >= self.workers {
            match in_flight.join_next().await {
                Some(result) => log_join_result(result),
                None => break,
            }
        }

        let engine = self.engine.clone();
        let registry = self.registry.clone();
        let cancel = self.abort.child_token();

        in_flight.spawn(async move {
            let id = request.id();
            registry.mark_running(id);
            QueueMetrics::job_started();

            let options = SubmitOptions::default().with_cancel(cancel);
            let outcome = engine.submit_with(&request, options).await;

            registry.complete(id, &outcome);
            QueueMetrics::job_finished();
            debug!(job_id = %id, outcome = outcome.label(), "Job finished");
        });
    }
}

fn log_join_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        warn!(error = %e, "Delivery task ended abnormally");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeliveryConfig;
    use crate::notification::NotificationKind;
    use crate::renderer::RendererRegistry;
    use crate::testing::ScriptedTransport;
    use crate::transport::TransportError;
    use serde_json::json;

    fn request() -> NotificationRequest {
        NotificationRequest::new(
            NotificationKind::budget_alert(),
            "asha@example.com",
            json!({
                "userName": "Asha",
                "percentageUsed": 85,
                "budgetAmount": 400000,
                "totalExpenses": 340000
            }),
        )
        .unwrap()
    }

    fn engine(transport: ScriptedTransport) -> DeliveryEngine {
        DeliveryEngine::new(
            &DeliveryConfig::default(),
            Arc::new(RendererRegistry::builtin().unwrap()),
            Arc::new(transport),
        )
        .unwrap()
    }

    async fn wait_finished(queue: &DeliveryQueue, id: &Uuid) -> JobRecord {
        for _ in 0..1000 {
            if let Some(record) = queue.status(id) {
                if record.status.is_finished() {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not finish");
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueued_job_is_delivered() {
        let queue =
            DeliveryQueue::start(engine(ScriptedTransport::succeeding()), QueueConfig::default());

        let id = queue.enqueue(request()).unwrap();
        let record = wait_finished(&queue, &id).await;

        assert_eq!(record.status, JobStatus::Delivered);
        assert_eq!(record.kind, "budget_alert");
        let summary = record.outcome.unwrap();
        assert_eq!(summary.attempts, 1);
        assert_eq!(summary.outcome, "delivered");
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_rejects() {
        let config = QueueConfig {
            capacity: 1,
            workers: 1,
            ..Default::default()
        };
        let queue = DeliveryQueue::start(engine(ScriptedTransport::succeeding()), config);

        // No await in between: the dispatcher has not had a chance to drain
        let first = request();
        let second = request();
        let second_id = second.id();
        assert!(queue.enqueue(first).is_ok());
        assert_eq!(queue.enqueue(second), Err(QueueError::Full));
        assert!(queue.status(&second_id).is_none());
        assert_eq!(queue.stats().buffered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_redelivery_keeps_original_record() {
        let config = QueueConfig {
            capacity: 1,
            workers: 1,
            ..Default::default()
        };
        let queue = DeliveryQueue::start(engine(ScriptedTransport::succeeding()), config);

        let original = request();
        let id = original.id();
        queue.enqueue(original).unwrap();

        // Queue is full, so the redelivery is turned away before the registry is touched
        assert_eq!(queue.enqueue(request().with_id(id)), Err(QueueError::Full));
        assert_eq!(queue.status(&id).unwrap().status, JobStatus::Queued);

        queue.shutdown(Duration::from_secs(30)).await;

        let record = queue.status(&id).unwrap();
        assert_eq!(record.status, JobStatus::Delivered);
        assert_eq!(record.outcome.unwrap().attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_of_pending_job_rejected() {
        let queue =
            DeliveryQueue::start(engine(ScriptedTransport::succeeding()), QueueConfig::default());

        let original = request();
        let id = original.id();
        queue.enqueue(original).unwrap();

        assert_eq!(queue.enqueue(request().with_id(id)), Err(QueueError::Duplicate(id)));
        assert_eq!(queue.stats().buffered, 1);

        // Once finished, the same id may be submitted again
        let record = wait_finished(&queue, &id).await;
        assert_eq!(record.status, JobStatus::Delivered);
        assert_eq!(queue.enqueue(request().with_id(id)), Ok(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_then_rejects() {
        let queue =
            DeliveryQueue::start(engine(ScriptedTransport::succeeding()), QueueConfig::default());

        let ids: Vec<Uuid> = (0..5).map(|_| queue.enqueue(request()).unwrap()).collect();
        queue.shutdown(Duration::from_secs(30)).await;

        for id in &ids {
            assert_eq!(queue.status(id).unwrap().status, JobStatus::Delivered);
        }
        assert!(!queue.is_accepting());
        assert_eq!(queue.enqueue(request()), Err(QueueError::ShuttingDown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_timeout_cancels_retrying_jobs() {
        let transport =
            ScriptedTransport::always(TransportError::Network("connection reset".into()));
        let queue = DeliveryQueue::start(engine(transport), QueueConfig::default());

        let id = queue.enqueue(request()).unwrap();
        queue.shutdown(Duration::from_millis(500)).await;

        let record = queue.status(&id).unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        let summary = record.outcome.unwrap();
        assert_eq!(summary.outcome, "cancelled");
        assert_eq!(summary.attempts, 1);
    }
}
