//! Delivery engine: render once, then drive the transport through the retry policy

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DeliveryConfig;
use crate::metrics::DeliveryMetrics;
use crate::notification::NotificationRequest;
use crate::renderer::RendererRegistry;
use crate::transport::{
    CodeTableClassifier, ErrorClass, ErrorClassifier, Transport, TransportError,
};

use super::outcome::{AttemptOutcome, AttemptRecord, DeliveryOutcome, DeliveryStatus, FailureReason};
use super::retry::RetryPolicy;

/// Invalid engine configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineConfigError {
    #[error("max_attempts must be at least 1, got {0}")]
    InvalidMaxAttempts(u32),

    #[error("cap delay ({cap_ms}ms) must not be below base delay ({base_ms}ms)")]
    CapBelowBase { base_ms: u128, cap_ms: u128 },

    #[error("request timeout must be greater than zero")]
    ZeroTimeout,

    #[error("jitter_factor must be within 0.0..=1.0, got {0}")]
    InvalidJitter(f64),
}

/// Per-invocation options
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Absolute deadline overriding `now + request_timeout`
    pub deadline: Option<Instant>,
    /// Observed before each attempt and during retry waits
    pub cancel: Option<CancellationToken>,
}

impl SubmitOptions {
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Drives one request at a time from rendering to a terminal outcome.
///
/// Holds only immutable configuration and shared collaborators, so a single
/// engine (or its clones) can serve any number of concurrent requests.
#[derive(Clone)]
pub struct DeliveryEngine {
    policy: RetryPolicy,
    request_timeout: Duration,
    renderers: Arc<RendererRegistry>,
    transport: Arc<dyn Transport>,
    classifier: Arc<dyn ErrorClassifier>,
}

impl DeliveryEngine {
    /// Build an engine, using the configured code table for classification
    pub fn new(
        config: &DeliveryConfig,
        renderers: Arc<RendererRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, EngineConfigError> {
        Self::with_policy(
            RetryPolicy::from_config(config),
            Duration::from_millis(config.request_timeout_ms),
            renderers,
            transport,
        )
        .map(|engine| engine.with_classifier(Arc::new(CodeTableClassifier::from_config(config))))
    }

    /// Build an engine from an explicit policy and timeout
    pub fn with_policy(
        policy: RetryPolicy,
        request_timeout: Duration,
        renderers: Arc<RendererRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, EngineConfigError> {
        validate(&policy, request_timeout)?;

        Ok(Self {
            policy,
            request_timeout,
            renderers,
            transport,
            classifier: Arc::new(CodeTableClassifier::new()),
        })
    }

    /// Replace the transient/permanent classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn renderers(&self) -> &RendererRegistry {
        &self.renderers
    }

    /// Deliver a request with the default deadline and no cancellation
    pub async fn submit(&self, request: &NotificationRequest) -> DeliveryOutcome {
        self.submit_with(request, SubmitOptions::default()).await
    }

    /// Deliver a request. Never fails: every error becomes a terminal outcome.
    #[tracing::instrument(
        name = "engine.submit",
        skip(self, request, options),
        fields(request_id = %request.id(), kind = %request.kind())
    )]
    pub async fn submit_with(
        &self,
        request: &NotificationRequest,
        options: SubmitOptions,
    ) -> DeliveryOutcome {
        let started = Instant::now();
        let kind = request.kind().as_str();
        let mut trace: Vec<AttemptRecord> = Vec::new();

        let mut payload = match self.renderers.render(request.kind(), request.data()) {
            Ok(payload) => payload,
            Err(e) => {
                return self.finish(
                    request,
                    started,
                    trace,
                    DeliveryStatus::Failed(FailureReason::Render(e)),
                );
            }
        };
        if payload.reference.is_none() {
            payload = payload.with_reference(request.id().to_string());
        }

        let deadline = options
            .deadline
            .unwrap_or_else(|| Instant::now() + self.request_timeout);
        let cancel = options.cancel.unwrap_or_default();

        let mut attempt: u32 = 1;
        let mut delay_before = Duration::ZERO;
        let mut last_error: Option<TransportError> = None;

        loop {
            if cancel.is_cancelled() {
                let status = DeliveryStatus::Failed(FailureReason::Cancelled { last_error });
                return self.finish(request, started, trace, status);
            }

            let attempt_started = Instant::now();
            if attempt_started > deadline {
                let status = DeliveryStatus::Failed(FailureReason::TimedOut { last_error });
                return self.finish(request, started, trace, status);
            }

            debug!(attempt, transport = self.transport.name(), "Attempting delivery");
            let result = self.transport.deliver(request.recipient(), &payload).await;
            let duration = attempt_started.elapsed();

            let mut record = AttemptRecord {
                attempt_number: attempt,
                started_at: attempt_started,
                delay_before,
                duration,
                outcome: AttemptOutcome::Success,
            };

            let error = match result {
                Ok(receipt) => {
                    DeliveryMetrics::record_attempt(kind, record.outcome.label());
                    trace.push(record);
                    let status = DeliveryStatus::Delivered { receipt };
                    return self.finish(request, started, trace, status);
                }
                Err(e) => e,
            };

            if self.classifier.classify(&error) == ErrorClass::Permanent {
                record.outcome = AttemptOutcome::PermanentFailure(error.clone());
                DeliveryMetrics::record_attempt(kind, record.outcome.label());
                trace.push(record);
                let status = DeliveryStatus::Failed(FailureReason::Permanent(error));
                return self.finish(request, started, trace, status);
            }

            record.outcome = AttemptOutcome::TransientFailure(error.clone());
            DeliveryMetrics::record_attempt(kind, record.outcome.label());
            trace.push(record);

            if attempt >= self.policy.max_attempts() {
                let status = DeliveryStatus::Failed(FailureReason::Exhausted { last_error: error });
                return self.finish(request, started, trace, status);
            }

            let delay = self.policy.next_delay(attempt);
            if Instant::now() + delay > deadline {
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retry would overrun deadline"
                );
                let status = DeliveryStatus::Failed(FailureReason::TimedOut {
                    last_error: Some(error),
                });
                return self.finish(request, started, trace, status);
            }

            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient delivery failure, retrying"
            );
            last_error = Some(error);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let status = DeliveryStatus::Failed(FailureReason::Cancelled { last_error });
                    return self.finish(request, started, trace, status);
                }
                _ = sleep(delay) => {}
            }

            attempt += 1;
            delay_before = delay;
        }
    }

    fn finish(
        &self,
        request: &NotificationRequest,
        started: Instant,
        trace: Vec<AttemptRecord>,
        status: DeliveryStatus,
    ) -> DeliveryOutcome {
        let outcome = DeliveryOutcome {
            request_id: request.id(),
            status,
            attempts: trace.len() as u32,
            elapsed: started.elapsed(),
            trace,
        };

        DeliveryMetrics::record_outcome(request.kind().as_str(), outcome.label(), outcome.elapsed);

        match outcome.failure() {
            None => info!(
                attempts = outcome.attempts,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "Notification delivered"
            ),
            Some(reason) => warn!(
                attempts = outcome.attempts,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                reason = reason.code(),
                error = %reason,
                "Notification delivery failed"
            ),
        }

        outcome
    }
}

fn validate(policy: &RetryPolicy, request_timeout: Duration) -> Result<(), EngineConfigError> {
    if policy.max_attempts < 1 {
        return Err(EngineConfigError::InvalidMaxAttempts(policy.max_attempts));
    }

    if policy.max_delay < policy.base_delay {
        return Err(EngineConfigError::CapBelowBase {
            base_ms: policy.base_delay.as_millis(),
            cap_ms: policy.max_delay.as_millis(),
        });
    }

    if request_timeout.is_zero() {
        return Err(EngineConfigError::ZeroTimeout);
    }

    if !(0.0..=1.0).contains(&policy.jitter_factor) {
        return Err(EngineConfigError::InvalidJitter(policy.jitter_factor));
    }

    Ok(())
}
