//! HTTP delivery of generated events to the webhook sink

use crate::config::{Config, SecretToken};
use crate::errors::{EventGenError, Result};
use crate::event::{ContentType, Payload};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of a successful delivery
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryResult {
    pub status: u16,
    pub content_type: ContentType,
    pub bytes_sent: usize,
    pub duration: Duration,
}

/// Destination for generated events.
///
/// One call is one delivery attempt; implementations do not retry.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn dispatch(&self, payload: &Payload) -> Result<DeliveryResult>;
}

/// POSTs each event to a webhook with a bearer token
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    webhook_url: String,
    auth_token: SecretToken,
}

impl HttpSink {
    pub fn new(webhook_url: String, auth_token: SecretToken, http_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(http_timeout)
            .user_agent(format!("audit_eventgen/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(EventGenError::Http)?;

        Ok(Self {
            client,
            webhook_url,
            auth_token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.webhook_url.clone(),
            config.auth_token.clone(),
            config.http_timeout(),
        )
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    async fn handle_response(
        &self,
        response: Response,
        content_type: ContentType,
        bytes_sent: usize,
        started: Instant,
    ) -> Result<DeliveryResult> {
        let status = response.status();

        if status.is_success() {
            debug!("Data successfully sent. Status code: {}", status.as_u16());
            return Ok(DeliveryResult {
                status: status.as_u16(),
                content_type,
                bytes_sent,
                duration: started.elapsed(),
            });
        }

        let error_body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());

        let message = match status.as_u16() {
            401 => format!("Unauthorized: {}", error_body),
            403 => format!("Forbidden: {}", error_body),
            404 => format!("Webhook endpoint not found: {}", error_body),
            413 => format!("Event too large: {}", error_body),
            429 => format!("Rate limited: {}", error_body),
            500..=599 => format!("Sink server error: {}", error_body),
            _ => format!("Unexpected response: {}", error_body),
        };

        Err(EventGenError::Delivery {
            status: Some(status.as_u16()),
            message,
        })
    }
}

#[async_trait]
impl EventSink for HttpSink {
    async fn dispatch(&self, payload: &Payload) -> Result<DeliveryResult> {
        let content_type = payload.content_type();
        let body = payload.body()?;
        let bytes_sent = body.len();
        let started = Instant::now();

        let response = self
            .client
            .post(&self.webhook_url)
            .header(CONTENT_TYPE, content_type.as_str())
            .header(AUTHORIZATION, format!("Bearer {}", self.auth_token.expose()))
            .body(body)
            .send()
            .await
            .map_err(|e| EventGenError::Delivery {
                status: None,
                message: e.to_string(),
            })?;

        self.handle_response(response, content_type, bytes_sent, started)
            .await
    }
}
