//! Delivery scheduling and retry.
//!
//! [`DeliveryEngine::submit`] renders a request exactly once, then calls the
//! transport until it succeeds, fails permanently, runs out of attempts or
//! would overrun the request deadline. Waits between attempts are
//! `tokio::time::sleep`, so thousands of requests can back off concurrently
//! on a handful of threads.

mod engine;
mod outcome;
mod retry;

pub use engine::{DeliveryEngine, EngineConfigError, SubmitOptions};
pub use outcome::{AttemptOutcome, AttemptRecord, DeliveryOutcome, DeliveryStatus, FailureReason};
pub use retry::RetryPolicy;
