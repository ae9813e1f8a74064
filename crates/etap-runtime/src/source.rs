// SPDX-License-Identifier: MIT OR Apache-2.0
//! Upstream event source.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

/// Events returned by one poll, as parallel `ids` / `events` sequences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    /// Upstream event ids, in stream order.
    #[serde(default)]
    pub ids: Vec<String>,
    /// Event payloads, one per id.
    #[serde(default)]
    pub events: Vec<Value>,
}

impl EventBatch {
    /// Number of events in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// `true` when the poll returned nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Id of the last event, which becomes the next checkpoint.
    #[must_use]
    pub fn last_id(&self) -> Option<&str> {
        self.ids.last().map(String::as_str)
    }

    fn check(self) -> Result<Self, SourceError> {
        if self.ids.len() == self.events.len() {
            Ok(self)
        } else {
            Err(SourceError::Malformed(format!(
                "{} ids but {} events",
                self.ids.len(),
                self.events.len()
            )))
        }
    }
}

/// Poll failures.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The request could not be sent or the response body not read.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The source answered with a non-200 status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The response did not have the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Source of upstream events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch at most `limit` events strictly after `after`.
    ///
    /// An empty `after` means the start of the stream.
    async fn poll(&self, after: &str, limit: usize) -> Result<EventBatch, SourceError>;
}

/// [`EventSource`] speaking `GET {base}/events?after=<cursor>&limit=<n>`.
#[derive(Debug, Clone)]
pub struct HttpEventSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpEventSource {
    /// Create a source for the event service at `base_url`.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    fn events_url(&self) -> String {
        format!("{}/events", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn poll(&self, after: &str, limit: usize) -> Result<EventBatch, SourceError> {
        let mut req = self.client.get(self.events_url()).query(&[("limit", limit)]);
        if !after.is_empty() {
            req = req.query(&[("after", after)]);
        }
        let response = req.send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: crate::truncate(body),
            });
        }

        let bytes = response.bytes().await?;
        let batch: EventBatch =
            serde_json::from_slice(&bytes).map_err(|e| SourceError::Malformed(e.to_string()))?;
        batch.check()
    }
}

/// In-process [`EventSource`] over an append-only vector.
///
/// Ids are zero-padded sequence numbers, so lexicographic and stream order
/// agree. Used by embedders that feed events directly and by tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSource {
    events: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MemoryEventSource {
    /// An empty stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return its id.
    pub fn push(&self, event: Value) -> String {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let id = format!("{:020}", events.len() + 1);
        events.push((id.clone(), event));
        id
    }

    /// Number of events appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// `true` before the first [`push`](Self::push).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventSource for MemoryEventSource {
    async fn poll(&self, after: &str, limit: usize) -> Result<EventBatch, SourceError> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let start = if after.is_empty() {
            0
        } else {
            events.partition_point(|(id, _)| id.as_str() <= after)
        };
        let mut batch = EventBatch::default();
        for (id, event) in events.iter().skip(start).take(limit) {
            batch.ids.push(id.clone());
            batch.events.push(event.clone());
        }
        Ok(batch)
    }
}
