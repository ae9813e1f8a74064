// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tap definitions and the JSON payload contracts of the event-tap control plane.
//!
//! A *tap* couples a transform script with a webhook destination. This crate
//! holds the immutable definition ([`TapOptions`]), the shapes exchanged over
//! HTTP ([`TapId`], [`TapListEntry`], [`TapListPage`], [`TapDetails`]) and the
//! request validation applied before a definition is persisted.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

/// Fixed number of entries per page returned by `GET /taps`.
pub const LIST_PAGE_SIZE: usize = 100;

/// Name of the function every transform script must define.
pub const ENTRY_POINT: &str = "mapEvents";

/// Upper bound accepted for [`TapOptions::batch_limit`].
pub const MAX_BATCH_LIMIT: usize = 10_000;

// ---------------------------------------------------------------------------
// Tap definition
// ---------------------------------------------------------------------------

/// Immutable definition of a tap.
///
/// Serialized as-is into the registry under `taps/<id>/options` and accepted
/// verbatim as the `POST /taps` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TapOptions {
    /// Human label; not used for identity.
    pub name: String,
    /// Source text of the transform script. Must define `mapEvents`.
    pub code: String,
    /// Delivery target for transformed batches.
    pub webhook_url: String,
    /// Maximum number of events pulled per poll cycle.
    pub batch_limit: usize,
}

impl TapOptions {
    /// Check the definition before it is persisted.
    ///
    /// Every problem is reported, not just the first one.
    ///
    /// # Errors
    ///
    /// Returns the list of human-readable validation failures.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("name must not be empty".to_string());
        }
        if self.code.trim().is_empty() {
            errors.push("code must not be empty".to_string());
        }
        if let Err(e) = validate_webhook_url(&self.webhook_url) {
            errors.push(e);
        }
        if self.batch_limit == 0 || self.batch_limit > MAX_BATCH_LIMIT {
            errors.push(format!(
                "batch_limit {} out of range (1..={MAX_BATCH_LIMIT})",
                self.batch_limit
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn validate_webhook_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| format!("webhook_url '{raw}' is not a valid URL: {e}"))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("webhook_url scheme '{other}' is not http or https")),
    }
    if url.host_str().is_none() {
        return Err(format!("webhook_url '{raw}' has no host"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Control-plane payloads
// ---------------------------------------------------------------------------

/// Response body of `POST /taps`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TapId {
    /// Identifier assigned to the new tap.
    pub id: String,
}

/// One row of the `GET /taps` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TapListEntry {
    /// Tap identifier.
    pub id: String,
    /// Human label.
    pub name: String,
    /// Delivery target.
    pub webhook_url: String,
}

/// A page of the `GET /taps` listing.
///
/// `cursor` is the id of the last entry when more entries may follow; it is
/// omitted once the listing is exhausted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TapListPage {
    /// Entries in ascending id order.
    pub entries: Vec<TapListEntry>,
    /// Resume position for the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl TapListPage {
    /// Returns `true` when no further page follows this one.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.cursor.is_none()
    }
}

/// Counters kept in memory by a running tap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunnerStatsSnapshot {
    /// Loop iterations started, successful or not.
    pub iterations: u64,
    /// Events received from the upstream source.
    pub polled_events: u64,
    /// Webhook POSTs that were acknowledged.
    pub deliveries: u64,
    /// Transformed values carried by acknowledged POSTs.
    pub delivered_values: u64,
    /// Failed iterations since the last fully successful one.
    pub consecutive_failures: u64,
    /// Failed iterations over the runner's lifetime.
    pub total_failures: u64,
    /// Most recent failure message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Response body of `GET /taps/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TapDetails {
    /// Tap identifier.
    pub id: String,
    /// Human label.
    pub name: String,
    /// Delivery target.
    pub webhook_url: String,
    /// Maximum number of events pulled per poll cycle.
    pub batch_limit: usize,
    /// Last upstream event fully accounted for; absent before the first advance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
    /// Advisory outcome of the most recent loop iteration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Whether this process currently owns a runner for the tap.
    pub running: bool,
    /// Runner counters, present while `running` is `true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<RunnerStatsSnapshot>,
}

impl TapDetails {
    /// Build the persisted part of the details from a definition.
    #[must_use]
    pub fn from_options(id: impl Into<String>, options: &TapOptions) -> Self {
        Self {
            id: id.into(),
            name: options.name.clone(),
            webhook_url: options.webhook_url.clone(),
            batch_limit: options.batch_limit,
            checkpoint: None,
            status: None,
            running: false,
            stats: None,
        }
    }
}

impl From<(&str, &TapOptions)> for TapListEntry {
    fn from((id, options): (&str, &TapOptions)) -> Self {
        Self {
            id: id.to_string(),
            name: options.name.clone(),
            webhook_url: options.webhook_url.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
