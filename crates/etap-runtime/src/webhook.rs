// SPDX-License-Identifier: MIT OR Apache-2.0
//! Webhook delivery.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

/// Delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The request could not be sent.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The receiver answered with something other than 200 or 202.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
}

/// Destination for transformed batches.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    /// POST `values` as one JSON array to `url`.
    async fn deliver(&self, url: &str, values: &[Value]) -> Result<(), DeliveryError>;
}

/// [`WebhookSink`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpWebhook {
    client: reqwest::Client,
}

impl HttpWebhook {
    /// Deliver through `client`.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookSink for HttpWebhook {
    async fn deliver(&self, url: &str, values: &[Value]) -> Result<(), DeliveryError> {
        let response = self.client.post(url).json(values).send().await?;
        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::ACCEPTED {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Status {
            status: status.as_u16(),
            body: crate::truncate(body),
        })
    }
}
