//! Delivery engine behaviour under scripted transport results.
//!
//! All tests run on a paused clock, so backoff delays and deadlines are
//! observed exactly rather than approximately.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use notification_delivery::delivery::{
    DeliveryEngine, DeliveryStatus, FailureReason, RetryPolicy, SubmitOptions,
};
use notification_delivery::notification::{NotificationKind, NotificationRequest};
use notification_delivery::renderer::{RenderError, RendererRegistry};
use notification_delivery::testing::{CountingRenderer, ScriptedTransport};
use notification_delivery::transport::{ErrorClass, TransportError};

const KIND: &str = "test_kind";

struct Harness {
    engine: DeliveryEngine,
    renderer: Arc<CountingRenderer>,
    transport: Arc<ScriptedTransport>,
}

fn harness(policy: RetryPolicy, timeout: Duration, transport: ScriptedTransport) -> Harness {
    harness_with_renderer(
        policy,
        timeout,
        transport,
        CountingRenderer::new(NotificationKind::new(KIND).unwrap()),
    )
}

fn harness_with_renderer(
    policy: RetryPolicy,
    timeout: Duration,
    transport: ScriptedTransport,
    renderer: CountingRenderer,
) -> Harness {
    let renderer = Arc::new(renderer);
    let transport = Arc::new(transport);

    let mut registry = RendererRegistry::new();
    registry.register(renderer.clone());

    let engine = DeliveryEngine::with_policy(policy, timeout, Arc::new(registry), transport.clone())
        .unwrap();

    Harness {
        engine,
        renderer,
        transport,
    }
}

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_attempts,
        Duration::from_millis(1000),
        Duration::from_millis(30_000),
    )
}

fn long_timeout() -> Duration {
    Duration::from_millis(600_000)
}

fn request() -> NotificationRequest {
    NotificationRequest::new(
        NotificationKind::new(KIND).unwrap(),
        "asha@example.com",
        json!({ "subject": "Your report" }),
    )
    .unwrap()
}

fn transient() -> TransportError {
    TransportError::Rejected {
        status: 503,
        message: "service unavailable".to_string(),
    }
}

fn permanent() -> TransportError {
    TransportError::Rejected {
        status: 422,
        message: "invalid recipient".to_string(),
    }
}

fn millis(values: &[u64]) -> Vec<Duration> {
    values.iter().map(|ms| Duration::from_millis(*ms)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_first_call_success() {
    let h = harness(policy(5), long_timeout(), ScriptedTransport::succeeding());
    let req = request();

    let outcome = h.engine.submit(&req).await;

    assert!(outcome.is_delivered());
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.request_id, req.id());
    assert!(outcome.delays().is_empty());
    assert_eq!(h.renderer.count(), 1);
    assert_eq!(h.transport.call_count(), 1);

    let call = &h.transport.calls()[0];
    assert_eq!(call.recipient, "asha@example.com");
    assert_eq!(call.subject, "Your report");
    assert_eq!(call.reference.as_deref(), Some(req.id().to_string().as_str()));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_then_success() {
    for k in 0..5u32 {
        let errors = (0..k).map(|_| transient()).collect();
        let h = harness(policy(5), long_timeout(), ScriptedTransport::failing_then_ok(errors));

        let outcome = h.engine.submit(&request()).await;

        assert!(outcome.is_delivered(), "k = {k}");
        assert_eq!(outcome.attempts, k + 1);
        assert_eq!(h.transport.call_count() as u32, k + 1);
        assert_eq!(h.renderer.count(), 1, "rendering must not repeat on retry");
    }
}

#[tokio::test(start_paused = true)]
async fn test_two_failures_then_success_waits_1s_then_2s() {
    let h = harness(
        policy(3),
        long_timeout(),
        ScriptedTransport::failing_then_ok(vec![transient(), transient()]),
    );

    let outcome = h.engine.submit(&request()).await;

    assert!(outcome.is_delivered());
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.delays(), millis(&[1000, 2000]));
    assert_eq!(h.transport.gaps(), millis(&[1000, 2000]));
    assert_eq!(outcome.elapsed, Duration::from_millis(3000));
}

#[tokio::test(start_paused = true)]
async fn test_always_transient_exhausts_attempts() {
    let h = harness(policy(3), long_timeout(), ScriptedTransport::always(transient()));

    let outcome = h.engine.submit(&request()).await;

    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.delays(), millis(&[1000, 2000]));
    assert_eq!(
        outcome.status,
        DeliveryStatus::Failed(FailureReason::Exhausted {
            last_error: transient()
        })
    );
    assert_eq!(h.transport.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_default_policy_delay_sequence() {
    let h = harness(
        RetryPolicy::default(),
        long_timeout(),
        ScriptedTransport::always(TransportError::Network("connection reset".into())),
    );

    let outcome = h.engine.submit(&request()).await;

    assert_eq!(outcome.attempts, 5);
    assert_eq!(outcome.delays(), millis(&[1000, 2000, 4000, 8000]));
    assert_eq!(outcome.failure().map(|r| r.code()), Some("exhausted"));
}

#[tokio::test(start_paused = true)]
async fn test_delays_are_capped() {
    let capped = RetryPolicy::new(5, Duration::from_millis(1000), Duration::from_millis(3000));
    let h = harness(capped, long_timeout(), ScriptedTransport::always(transient()));

    let outcome = h.engine.submit(&request()).await;

    assert_eq!(outcome.delays(), millis(&[1000, 2000, 3000, 3000]));
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_stops_immediately() {
    for i in 1..=4u32 {
        let mut script: Vec<_> = (1..i).map(|_| Err(transient())).collect();
        script.push(Err(permanent()));
        let transport = ScriptedTransport::new(script, Ok(Default::default()));
        let h = harness(policy(5), long_timeout(), transport);

        let outcome = h.engine.submit(&request()).await;

        assert_eq!(outcome.attempts, i);
        assert_eq!(h.transport.call_count() as u32, i);
        assert_eq!(
            outcome.status,
            DeliveryStatus::Failed(FailureReason::Permanent(permanent()))
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_deadline_shorter_than_backoff_times_out() {
    let h = harness(
        policy(5),
        Duration::from_millis(2500),
        ScriptedTransport::always(transient()),
    );

    let outcome = h.engine.submit(&request()).await;

    // 0ms fail, wait 1000, 1000ms fail, next wait of 2000 would overrun 2500
    assert_eq!(outcome.attempts, 2);
    assert_eq!(
        outcome.status,
        DeliveryStatus::Failed(FailureReason::TimedOut {
            last_error: Some(transient())
        })
    );
    assert_eq!(outcome.elapsed, Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_explicit_deadline_overrides_timeout() {
    let h = harness(policy(5), long_timeout(), ScriptedTransport::always(transient()));

    let deadline = Instant::now() + Duration::from_millis(1500);
    let outcome = h
        .engine
        .submit_with(&request(), SubmitOptions::default().with_deadline(deadline))
        .await;

    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.failure().map(|r| r.code()), Some("timed_out"));
}

#[tokio::test(start_paused = true)]
async fn test_expired_deadline_makes_no_attempt() {
    let h = harness(policy(5), long_timeout(), ScriptedTransport::succeeding());

    let deadline = Instant::now();
    tokio::time::advance(Duration::from_millis(1)).await;

    let outcome = h
        .engine
        .submit_with(&request(), SubmitOptions::default().with_deadline(deadline))
        .await;

    assert_eq!(outcome.attempts, 0);
    assert_eq!(
        outcome.status,
        DeliveryStatus::Failed(FailureReason::TimedOut { last_error: None })
    );
    assert_eq!(h.transport.call_count(), 0);
    assert_eq!(h.renderer.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_render_failure_makes_no_transport_call() {
    let renderer = CountingRenderer::failing(
        NotificationKind::new(KIND).unwrap(),
        RenderError::InvalidData {
            kind: KIND.to_string(),
            message: "missing field `userName`".to_string(),
        },
    );
    let h = harness_with_renderer(
        policy(5),
        long_timeout(),
        ScriptedTransport::succeeding(),
        renderer,
    );

    let outcome = h.engine.submit(&request()).await;

    assert_eq!(outcome.attempts, 0);
    assert!(matches!(
        outcome.status,
        DeliveryStatus::Failed(FailureReason::Render(RenderError::InvalidData { .. }))
    ));
    assert_eq!(h.renderer.count(), 1);
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_kind_is_render_failure() {
    let h = harness(policy(5), long_timeout(), ScriptedTransport::succeeding());
    let req = NotificationRequest::new(
        NotificationKind::new("sms_digest").unwrap(),
        "asha@example.com",
        json!({}),
    )
    .unwrap();

    let outcome = h.engine.submit(&req).await;

    assert_eq!(
        outcome.status,
        DeliveryStatus::Failed(FailureReason::Render(RenderError::UnknownKind(
            "sms_digest".to_string()
        )))
    );
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff() {
    let h = harness(policy(5), long_timeout(), ScriptedTransport::always(transient()));
    let cancel = CancellationToken::new();

    let engine = h.engine.clone();
    let options = SubmitOptions::default().with_cancel(cancel.clone());
    let task = tokio::spawn(async move { engine.submit_with(&request(), options).await });

    tokio::time::sleep(Duration::from_millis(500)).await;
    cancel.cancel();
    let outcome = task.await.unwrap();

    assert_eq!(outcome.attempts, 1);
    assert_eq!(
        outcome.status,
        DeliveryStatus::Failed(FailureReason::Cancelled {
            last_error: Some(transient())
        })
    );
    assert_eq!(outcome.elapsed, Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_first_attempt() {
    let h = harness(policy(5), long_timeout(), ScriptedTransport::succeeding());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = h
        .engine
        .submit_with(&request(), SubmitOptions::default().with_cancel(cancel))
        .await;

    assert_eq!(outcome.attempts, 0);
    assert_eq!(outcome.failure().map(|r| r.code()), Some("cancelled"));
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_injected_classifier() {
    let h = harness(
        policy(5),
        long_timeout(),
        ScriptedTransport::always(TransportError::Network("dns failure".into())),
    );
    let engine = h
        .engine
        .with_classifier(Arc::new(|_: &TransportError| ErrorClass::Permanent));

    let outcome = engine.submit(&request()).await;

    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.failure().map(|r| r.code()), Some("permanent"));
}

#[tokio::test(start_paused = true)]
async fn test_attempt_trace_is_ordered() {
    let h = harness(
        policy(4),
        long_timeout(),
        ScriptedTransport::failing_then_ok(vec![transient(), transient(), transient()]),
    );

    let outcome = h.engine.submit(&request()).await;

    let numbers: Vec<u32> = outcome.trace.iter().map(|a| a.attempt_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert!(outcome
        .trace
        .windows(2)
        .all(|pair| pair[0].started_at < pair[1].started_at));
    assert_eq!(outcome.trace[0].delay_before, Duration::ZERO);
    assert_eq!(outcome.trace[3].outcome.label(), "success");
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_back_off_independently() {
    let h = harness(policy(3), long_timeout(), ScriptedTransport::always(transient()));
    let started = Instant::now();

    let requests: Vec<NotificationRequest> = (0..50).map(|_| request()).collect();
    let outcomes = join_all(requests.iter().map(|req| h.engine.submit(req))).await;

    // Every request waits 1s + 2s; run serially that would be 150s
    assert_eq!(started.elapsed(), Duration::from_millis(3000));
    assert_eq!(h.transport.call_count(), 150);
    assert_eq!(h.renderer.count(), 50);

    for (req, outcome) in requests.iter().zip(&outcomes) {
        assert_eq!(outcome.request_id, req.id());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.failure().map(|r| r.code()), Some("exhausted"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_transport_does_not_block_others() {
    let h = harness(
        policy(1),
        long_timeout(),
        ScriptedTransport::succeeding().with_latency(Duration::from_millis(100)),
    );
    let started = Instant::now();

    let requests: Vec<NotificationRequest> = (0..20).map(|_| request()).collect();
    let outcomes = join_all(requests.iter().map(|req| h.engine.submit(req))).await;

    assert_eq!(started.elapsed(), Duration::from_millis(100));
    assert!(outcomes.iter().all(|o| o.is_delivered()));
    assert!(outcomes
        .iter()
        .all(|o| o.trace[0].duration == Duration::from_millis(100)));
}
