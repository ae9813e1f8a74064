// SPDX-License-Identifier: MIT OR Apache-2.0
//! etap-client
//!
//! Typed HTTP client for the event-tap control plane, plus the output
//! helpers used by the `etap` command-line tool.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Rendering of control-plane payloads for the terminal.
pub mod format;

use etap_core::{TapDetails, TapId, TapListEntry, TapListPage, TapOptions};
use reqwest::{Response, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default control-plane address.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:6677";

/// Errors returned by [`EtapClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server URL could not be used as a base.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    /// The request could not be sent or the response could not be read.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The tap does not exist.
    #[error("tap {0} not found")]
    NotFound(String),

    /// The server answered with an unexpected status.
    #[error("unexpected status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Server-supplied error message.
        message: String,
    },
}

/// Client for one event-tap daemon.
#[derive(Debug, Clone)]
pub struct EtapClient {
    http: reqwest::Client,
    taps_url: Url,
}

impl EtapClient {
    /// Client with a private connection pool and a 30 second timeout.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidUrl`] for a malformed or non-HTTP base URL.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("etap-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(http, base_url)
    }

    /// Client sharing an existing [`reqwest::Client`].
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidUrl`] for a malformed or non-HTTP base URL.
    pub fn with_client(http: reqwest::Client, base_url: &str) -> Result<Self, ClientError> {
        let mut base =
            Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(format!(
                "{base_url}: scheme must be http or https"
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let taps_url = base
            .join("taps")
            .map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self { http, taps_url })
    }

    /// The `/taps` collection URL requests go to.
    pub fn taps_url(&self) -> &Url {
        &self.taps_url
    }

    fn tap_url(&self, id: &str) -> Url {
        let mut url = self.taps_url.clone();
        // http(s) URLs always have path segments.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(id);
        }
        url
    }

    /// Create a tap and return its id.
    ///
    /// # Errors
    ///
    /// [`ClientError::Status`] when the server rejects the definition.
    pub async fn create(&self, options: &TapOptions) -> Result<String, ClientError> {
        let res = self
            .http
            .post(self.taps_url.clone())
            .json(options)
            .send()
            .await?;
        if res.status() != StatusCode::CREATED {
            return Err(status_error(res).await);
        }
        let TapId { id } = res.json().await?;
        debug!(target: "etap.client", tap_id = %id, "tap created");
        Ok(id)
    }

    /// One page of the listing, starting after `cursor`.
    ///
    /// # Errors
    ///
    /// Transport failures and non-200 answers.
    pub async fn list_page(&self, cursor: Option<&str>) -> Result<TapListPage, ClientError> {
        let mut req = self.http.get(self.taps_url.clone());
        if let Some(cursor) = cursor {
            req = req.query(&[("cursor", cursor)]);
        }
        let res = req.send().await?;
        if res.status() != StatusCode::OK {
            return Err(status_error(res).await);
        }
        Ok(res.json().await?)
    }

    /// Every tap, following cursors until the last page.
    ///
    /// # Errors
    ///
    /// The first failing page aborts the listing.
    pub async fn list(&self) -> Result<Vec<TapListEntry>, ClientError> {
        let mut entries = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.list_page(cursor.as_deref()).await?;
            debug!(target: "etap.client", entries = page.entries.len(), "fetched list page");
            entries.extend(page.entries);
            match page.cursor {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => break,
            }
        }
        Ok(entries)
    }

    /// Details of one tap, `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Transport failures and statuses other than 200/404.
    pub async fn get(&self, id: &str) -> Result<Option<TapDetails>, ClientError> {
        let res = self.http.get(self.tap_url(id)).send().await?;
        match res.status() {
            StatusCode::OK => Ok(Some(res.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(status_error(res).await),
        }
    }

    /// Delete a tap.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotFound`] for an unknown id.
    pub async fn delete(&self, id: &str) -> Result<(), ClientError> {
        let res = self.http.delete(self.tap_url(id)).send().await?;
        match res.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => {
                debug!(target: "etap.client", tap_id = %id, "tap deleted");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(id.to_string())),
            _ => Err(status_error(res).await),
        }
    }
}

async fn status_error(res: Response) -> ClientError {
    let status = res.status().as_u16();
    let body = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_string());
    ClientError::Status { status, message }
}
