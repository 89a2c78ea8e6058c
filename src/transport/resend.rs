//! Resend e-mail API transport

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ResendConfig;
use crate::notification::RenderedPayload;

use super::{DeliveryReceipt, Transport, TransportError};

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: String,
}

/// Sends rendered payloads through `POST {base_url}/emails`
pub struct ResendTransport {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    from: String,
}

impl ResendTransport {
    pub fn new(config: &ResendConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::NotConfigured(format!("HTTP client: {}", e)))?;

        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        if api_key.is_none() {
            warn!("RESEND_API is not set; every delivery will fail permanently");
        }

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            from: config.from.clone(),
        })
    }

    /// Whether an API key is present
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn error_message(response: reqwest::Response) -> String {
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) if !err.message.is_empty() => err.message,
            _ => body,
        }
    }
}

fn map_send_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
impl Transport for ResendTransport {
    fn name(&self) -> &'static str {
        "resend"
    }

    async fn deliver(
        &self,
        recipient: &str,
        payload: &RenderedPayload,
    ) -> Result<DeliveryReceipt, TransportError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            TransportError::NotConfigured("RESEND_API is not configured".to_string())
        })?;

        let body = SendEmailRequest {
            from: &self.from,
            to: [recipient],
            subject: &payload.subject,
            html: &payload.html,
            text: &payload.text,
        };

        let mut request = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(api_key)
            .json(&body);

        if let Some(reference) = &payload.reference {
            request = request.header("Idempotency-Key", reference);
        }

        let response = request.send().await.map_err(map_send_error)?;
        let status = response.status();

        if status.is_success() {
            // The provider accepted the message; a body we cannot read must not
            // turn into a retry that sends it twice.
            return match response.json::<SendEmailResponse>().await {
                Ok(sent) => {
                    debug!(message_id = %sent.id, "Resend accepted message");
                    Ok(DeliveryReceipt::with_message_id(sent.id))
                }
                Err(e) => {
                    warn!(error = %e, "Resend accepted message but response was unreadable");
                    Ok(DeliveryReceipt::default())
                }
            };
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());

            return Err(TransportError::RateLimited { retry_after_secs });
        }

        Err(TransportError::Rejected {
            status: status.as_u16(),
            message: Self::error_message(response).await,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_key_is_unconfigured() {
        let config = ResendConfig {
            api_key: Some("   ".to_string()),
            ..Default::default()
        };
        let transport = ResendTransport::new(&config).unwrap();
        assert!(!transport.is_configured());
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let config = ResendConfig {
            api_key: Some("re_123".to_string()),
            base_url: "http://localhost:9999/".to_string(),
            ..Default::default()
        };
        let transport = ResendTransport::new(&config).unwrap();
        assert_eq!(transport.base_url, "http://localhost:9999");
        assert!(transport.is_configured());
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let transport = ResendTransport::new(&ResendConfig::default()).unwrap();
        let payload = RenderedPayload::new("s", "<p>h</p>", "t");

        let err = transport
            .deliver("asha@example.com", &payload)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TransportError::NotConfigured("RESEND_API is not configured".to_string())
        );
    }
}
