//! Terminal results and per-attempt records

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::renderer::RenderError;
use crate::transport::{DeliveryReceipt, TransportError};

/// How a single attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    TransientFailure(TransportError),
    PermanentFailure(TransportError),
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::TransientFailure(_) => "transient",
            Self::PermanentFailure(_) => "permanent",
        }
    }
}

/// One transport call made on behalf of a request
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// 1-based, strictly increasing within a request
    pub attempt_number: u32,
    pub started_at: Instant,
    /// Backoff waited before this attempt; zero for the first
    pub delay_before: Duration,
    /// Time spent inside the transport call
    pub duration: Duration,
    pub outcome: AttemptOutcome,
}

/// Why a request ended without being delivered
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("render failed: {0}")]
    Render(RenderError),

    #[error("permanent transport failure: {0}")]
    Permanent(TransportError),

    #[error("attempts exhausted, last error: {last_error}")]
    Exhausted { last_error: TransportError },

    #[error("deadline exceeded{}", last_error_suffix(.last_error))]
    TimedOut { last_error: Option<TransportError> },

    #[error("cancelled{}", last_error_suffix(.last_error))]
    Cancelled { last_error: Option<TransportError> },
}

fn last_error_suffix(last_error: &Option<TransportError>) -> String {
    match last_error {
        Some(err) => format!(", last error: {}", err),
        None => String::new(),
    }
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Render(_) => "render",
            Self::Permanent(_) => "permanent",
            Self::Exhausted { .. } => "exhausted",
            Self::TimedOut { .. } => "timed_out",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Transport error that caused or preceded the failure, if any
    pub fn last_transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Render(_) => None,
            Self::Permanent(err) | Self::Exhausted { last_error: err } => Some(err),
            Self::TimedOut { last_error } | Self::Cancelled { last_error } => last_error.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered { receipt: DeliveryReceipt },
    Failed(FailureReason),
}

/// Terminal result of one engine invocation
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub request_id: Uuid,
    pub status: DeliveryStatus,
    /// Number of transport calls made
    pub attempts: u32,
    /// Wall-clock time from submission to the terminal state
    pub elapsed: Duration,
    pub trace: Vec<AttemptRecord>,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self.status, DeliveryStatus::Delivered { .. })
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.status {
            DeliveryStatus::Failed(reason) => Some(reason),
            DeliveryStatus::Delivered { .. } => None,
        }
    }

    pub fn receipt(&self) -> Option<&DeliveryReceipt> {
        match &self.status {
            DeliveryStatus::Delivered { receipt } => Some(receipt),
            DeliveryStatus::Failed(_) => None,
        }
    }

    /// Backoff delays waited between attempts, in order
    pub fn delays(&self) -> Vec<Duration> {
        self.trace.iter().skip(1).map(|a| a.delay_before).collect()
    }

    /// `delivered` or the failure code
    pub fn label(&self) -> &'static str {
        match &self.status {
            DeliveryStatus::Delivered { .. } => "delivered",
            DeliveryStatus::Failed(reason) => reason.code(),
        }
    }
}
