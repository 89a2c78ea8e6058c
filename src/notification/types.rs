use std::fmt;

use chrono::{DateTime, Utc};
use email_address::EmailAddress;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while building a notification request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Invalid notification kind: {0}")]
    InvalidKind(String),

    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),
}

/// Tag selecting which renderer turns a request's data into a payload.
///
/// The set is open: any tag made of alphanumerics, dash or underscore is
/// accepted here, and it is the renderer registry that decides whether the
/// kind can actually be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NotificationKind(String);

impl NotificationKind {
    pub const MONTHLY_REPORT: &'static str = "monthly_report";
    pub const BUDGET_ALERT: &'static str = "budget_alert";

    /// Create a kind from a tag, validating its format
    pub fn new(tag: impl Into<String>) -> Result<Self, RequestError> {
        let tag = tag.into();

        if tag.is_empty() || tag.len() > 64 {
            return Err(RequestError::InvalidKind(
                "kind must be 1-64 characters".to_string(),
            ));
        }

        if !tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(RequestError::InvalidKind(format!(
                "'{}' must contain only alphanumeric, dash, or underscore",
                tag
            )));
        }

        Ok(Self(tag))
    }

    pub fn monthly_report() -> Self {
        Self(Self::MONTHLY_REPORT.to_string())
    }

    pub fn budget_alert() -> Self {
        Self(Self::BUDGET_ALERT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for NotificationKind {
    type Error = RequestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NotificationKind> for String {
    fn from(kind: NotificationKind) -> Self {
        kind.0
    }
}

/// A request to deliver one notification.
///
/// Immutable once built: the delivery engine only ever borrows it.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationRequest {
    id: Uuid,
    kind: NotificationKind,
    recipient: String,
    data: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl NotificationRequest {
    /// Build a request, validating the recipient address
    pub fn new(
        kind: NotificationKind,
        recipient: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<Self, RequestError> {
        let recipient = recipient.into().trim().to_string();

        if !EmailAddress::is_valid(&recipient) {
            return Err(RequestError::InvalidRecipient(recipient));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            recipient,
            data,
            created_at: Utc::now(),
        })
    }

    /// Keep a caller-supplied identity, e.g. when a job is redelivered
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> &NotificationKind {
        &self.kind
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Final transport payload, rendered once per request and reused across attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedPayload {
    /// Subject line
    pub subject: String,
    /// HTML body
    pub html: String,
    /// Plain-text alternative body
    pub text: String,
    /// Stable reference transports may forward as a provider idempotency key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl RenderedPayload {
    pub fn new(
        subject: impl Into<String>,
        html: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            html: html.into(),
            text: text.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}
