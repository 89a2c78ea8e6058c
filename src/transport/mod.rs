//! Delivery transports.
//!
//! A [`Transport`] performs exactly one delivery attempt and reports what
//! went wrong without deciding whether the failure is worth retrying. That
//! decision belongs to an [`ErrorClassifier`], which the delivery engine
//! accepts as an injectable collaborator since only the concrete transport
//! knows which of its errors are transient.

mod classifier;
mod resend;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::notification::RenderedPayload;

pub use classifier::{CodeTableClassifier, ErrorClass, ErrorClassifier};
pub use resend::ResendTransport;

/// Failure of a single delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection or I/O failure before a response arrived
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Provider asked us to slow down
    #[error("Rate limited by provider")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Provider answered with a non-success status
    #[error("Provider returned HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Transport cannot send at all, e.g. missing credentials
    #[error("Transport not configured: {0}")]
    NotConfigured(String),
}

impl TransportError {
    /// Stable code used by classification tables and metrics
    pub fn code(&self) -> String {
        match self {
            Self::Network(_) => "network".to_string(),
            Self::Timeout(_) => "timeout".to_string(),
            Self::RateLimited { .. } => "rate_limited".to_string(),
            Self::Rejected { status, .. } => format!("http_{}", status),
            Self::NotConfigured(_) => "not_configured".to_string(),
        }
    }
}

/// Proof of a successful delivery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    /// Provider-assigned message identifier, when one was returned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl DeliveryReceipt {
    pub fn with_message_id(message_id: impl Into<String>) -> Self {
        Self {
            message_id: Some(message_id.into()),
        }
    }
}

/// Performs one delivery attempt.
///
/// Implementations own their connection pooling and per-call timeouts.
/// They must be safe to call concurrently.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Deliver a rendered payload to one recipient
    async fn deliver(
        &self,
        recipient: &str,
        payload: &RenderedPayload,
    ) -> Result<DeliveryReceipt, TransportError>;
}
