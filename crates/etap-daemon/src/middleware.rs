// SPDX-License-Identifier: MIT OR Apache-2.0
//! Middleware stack for the control-plane HTTP API.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

/// Header carrying the request id in both directions.
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

// ---------------------------------------------------------------------------
// RequestId middleware
// ---------------------------------------------------------------------------

/// A request identifier, available as an Axum extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

/// Axum middleware that tags each request with a [`RequestId`] and echoes it
/// in the `x-request-id` response header.
///
/// A well-formed id supplied by the caller is kept; otherwise a fresh UUID
/// is generated.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(RequestId(id.clone()));

    let mut resp = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        resp.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
    }
    resp
}

// ---------------------------------------------------------------------------
// RequestLogger
// ---------------------------------------------------------------------------

/// Axum middleware that logs method, path, status code, and duration for each
/// request using [`tracing`] structured fields.
pub struct RequestLogger;

impl RequestLogger {
    /// Axum-compatible handler function.
    pub async fn layer(req: Request, next: Next) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let request_id = req
            .extensions()
            .get::<RequestId>()
            .map(|r| r.0.clone())
            .unwrap_or_default();
        let span = info_span!(target: "etap.http", "request", %method, %path, %request_id);
        let start = Instant::now();

        let resp = next.run(req).instrument(span).await;

        let status = resp.status().as_u16();
        info!(
            target: "etap.http",
            {
                http.method = %method,
                http.path = %path,
                http.status = status,
                http.duration_ms = start.elapsed().as_millis() as u64,
                request_id = %request_id,
            },
            "request completed"
        );

        resp
    }
}
