//! Transient/permanent classification of transport errors

use std::collections::HashMap;

use serde::Serialize;

use crate::config::DeliveryConfig;

use super::TransportError;

/// Whether retrying the same payload might succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Permanent,
}

/// Decides whether a transport error is worth retrying
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &TransportError) -> ErrorClass;
}

impl<F> ErrorClassifier for F
where
    F: Fn(&TransportError) -> ErrorClass + Send + Sync,
{
    fn classify(&self, error: &TransportError) -> ErrorClass {
        self(error)
    }
}

/// Classifier keyed by [`TransportError::code`], with HTTP-style defaults.
///
/// Without overrides: network failures, timeouts, rate limiting, HTTP 408,
/// 429 and 5xx are transient; every other status and a missing
/// configuration are permanent.
#[derive(Debug, Clone, Default)]
pub struct CodeTableClassifier {
    overrides: HashMap<String, ErrorClass>,
}

impl CodeTableClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the configured override lists
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self::new()
            .with_transient(config.transient_codes.iter().cloned())
            .with_permanent(config.permanent_codes.iter().cloned())
    }

    /// Treat these codes as transient
    pub fn with_transient<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for code in codes {
            self.overrides.insert(code.into(), ErrorClass::Transient);
        }
        self
    }

    /// Treat these codes as permanent
    pub fn with_permanent<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for code in codes {
            self.overrides.insert(code.into(), ErrorClass::Permanent);
        }
        self
    }

    fn default_class(error: &TransportError) -> ErrorClass {
        match error {
            TransportError::Network(_)
            | TransportError::Timeout(_)
            | TransportError::RateLimited { .. } => ErrorClass::Transient,

            TransportError::Rejected { status, .. } => match status {
                408 | 429 | 500..=599 => ErrorClass::Transient,
                _ => ErrorClass::Permanent,
            },

            TransportError::NotConfigured(_) => ErrorClass::Permanent,
        }
    }
}

impl ErrorClassifier for CodeTableClassifier {
    fn classify(&self, error: &TransportError) -> ErrorClass {
        self.overrides
            .get(&error.code())
            .copied()
            .unwrap_or_else(|| Self::default_class(error))
    }
}
