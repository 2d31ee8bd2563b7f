//! Delivery strategies for notification destinations.

use crate::models::{event_message::EventNotification, notification::Destination};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP request timed out")]
    Timeout,
    #[error("HTTP request failed: {0}")]
    Request(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Something that can hand an event message to a destination.
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, payload: &EventNotification) -> Result<(), DeliveryError>;
}

/// POSTs the JSON message to an HTTP endpoint; any 2xx is success and the
/// response body is ignored.
pub struct WebhookDeliverer {
    client: Client,
    endpoint: String,
}

impl WebhookDeliverer {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Deliverer for WebhookDeliverer {
    async fn deliver(&self, payload: &EventNotification) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(payload)?;
        debug!(endpoint = %self.endpoint, bytes = body.len(), "posting event notification");

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout
                } else {
                    DeliveryError::Request(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status(status.as_u16()))
        }
    }
}

/// Builds the deliverer for a destination.
pub struct DelivererFactory {
    client: Client,
}

impl DelivererFactory {
    /// Shared HTTP client with a bounded per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("s3local/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeliveryError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn for_destination(&self, destination: &Destination) -> Box<dyn Deliverer> {
        match destination {
            Destination::Webhook { address, .. } => {
                Box::new(WebhookDeliverer::new(self.client.clone(), address.clone()))
            }
        }
    }
}
