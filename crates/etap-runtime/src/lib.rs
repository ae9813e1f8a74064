// SPDX-License-Identifier: MIT OR Apache-2.0
//! etap-runtime
//!
//! Tap execution engine.
//!
//! Responsibilities:
//! - persist tap definitions, checkpoints and status ([`TapRegistry`])
//! - run one poll → transform → deliver → checkpoint loop per tap ([`runner`])
//! - start, resume and cancel runners ([`TapManager`])
//! - talk to the upstream event source and webhook receivers over HTTP

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Cooperative cancellation.
pub mod cancel;
/// Lifecycle manager.
pub mod manager;
/// Persistent tap layout.
pub mod registry;
/// Tap runner loop.
pub mod runner;
/// Upstream event source.
pub mod source;
/// Per-runner counters.
pub mod stats;
/// Webhook delivery.
pub mod webhook;

pub use cancel::{CancellationReason, CancellationToken};
pub use manager::{ManagerError, TapManager};
pub use registry::{RegistryError, TapRegistry, TapStore};
pub use runner::{Peers, RunnerSettings, RunningTap, STATUS_OK, StartError};
pub use source::{EventBatch, EventSource, HttpEventSource, MemoryEventSource, SourceError};
pub use stats::RunnerStats;
pub use webhook::{DeliveryError, HttpWebhook, WebhookSink};

use std::sync::Arc;
use std::time::Duration;

/// Longest response body kept in poll and delivery errors.
pub const MAX_ERROR_BODY: usize = 512;

/// Build the HTTP client shared by the event source and webhook sink.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("etap/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// HTTP peers for an event service at `event_source_url`, sharing one client.
pub fn http_peers(client: reqwest::Client, event_source_url: impl Into<String>) -> Peers {
    Peers {
        source: Arc::new(HttpEventSource::new(client.clone(), event_source_url)),
        sink: Arc::new(HttpWebhook::new(client)),
    }
}

pub(crate) fn truncate(mut body: String) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut cut = MAX_ERROR_BODY;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    body.truncate(cut);
    body.push_str("...");
    body
}
