//! In-memory test doubles for the renderer and transport seams.
//!
//! Used by this crate's own tests and available to callers that want to
//! exercise code built on [`DeliveryEngine`](crate::delivery::DeliveryEngine)
//! without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::notification::{NotificationKind, RenderedPayload};
use crate::renderer::{RenderError, Renderer};
use crate::transport::{DeliveryReceipt, Transport, TransportError};

type DeliveryResult = Result<DeliveryReceipt, TransportError>;

/// One call observed by a [`ScriptedTransport`]
#[derive(Debug, Clone)]
pub struct TransportCall {
    pub at: Instant,
    pub recipient: String,
    pub subject: String,
    pub reference: Option<String>,
}

/// Transport that replays a fixed script of results.
///
/// Once the script runs out every call returns the fallback result.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<DeliveryResult>>,
    fallback: DeliveryResult,
    latency: Duration,
    calls: Mutex<Vec<TransportCall>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<DeliveryResult>, fallback: DeliveryResult) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call succeeds
    pub fn succeeding() -> Self {
        Self::new(vec![], Ok(DeliveryReceipt::default()))
    }

    /// Every call fails with `error`
    pub fn always(error: TransportError) -> Self {
        Self::new(vec![], Err(error))
    }

    /// The given errors in order, then success
    pub fn failing_then_ok(errors: Vec<TransportError>) -> Self {
        Self::new(
            errors.into_iter().map(Err).collect(),
            Ok(DeliveryReceipt::default()),
        )
    }

    /// Sleep this long inside every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.calls).clone()
    }

    /// Time between consecutive calls
    pub fn gaps(&self) -> Vec<Duration> {
        let calls = lock(&self.calls);
        calls
            .windows(2)
            .map(|pair| pair[1].at.duration_since(pair[0].at))
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn deliver(
        &self,
        recipient: &str,
        payload: &RenderedPayload,
    ) -> Result<DeliveryReceipt, TransportError> {
        lock(&self.calls).push(TransportCall {
            at: Instant::now(),
            recipient: recipient.to_string(),
            subject: payload.subject.clone(),
            reference: payload.reference.clone(),
        });

        let result = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        result
    }
}

/// Renderer that counts its invocations
pub struct CountingRenderer {
    kind: NotificationKind,
    fail_with: Option<RenderError>,
    count: AtomicUsize,
}

impl CountingRenderer {
    /// Renders `{"subject": ...}` data into a plain payload
    pub fn new(kind: NotificationKind) -> Self {
        Self {
            kind,
            fail_with: None,
            count: AtomicUsize::new(0),
        }
    }

    /// Always fails with `error`
    pub fn failing(kind: NotificationKind, error: RenderError) -> Self {
        Self {
            kind,
            fail_with: Some(error),
            count: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Renderer for CountingRenderer {
    fn kind(&self) -> NotificationKind {
        self.kind.clone()
    }

    fn render(&self, data: &serde_json::Value) -> Result<RenderedPayload, RenderError> {
        self.count.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }

        let subject = data
            .get("subject")
            .and_then(|s| s.as_str())
            .unwrap_or("test notification");

        Ok(RenderedPayload::new(
            subject,
            format!("<p>{}</p>", subject),
            subject,
        ))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
