// SPDX-License-Identifier: MIT OR Apache-2.0
//! etap-daemon
//!
//! HTTP control plane for event taps: create, list, inspect and delete taps
//! backed by a [`TapManager`].
#![deny(unsafe_code)]
#![warn(missing_docs)]
/// Middleware stack for the daemon HTTP API.
pub mod middleware;

use axum::{
    Json, Router,
    extract::rejection::JsonRejection,
    extract::{Path as AxPath, Query, State},
    http::StatusCode,
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use etap_core::{TapDetails, TapId, TapListPage, TapOptions};
use etap_runtime::{ManagerError, TapManager};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared application state for the daemon HTTP server.
#[derive(Clone)]
pub struct AppState {
    /// Owns every live tap runner.
    pub manager: Arc<TapManager>,
}

impl AppState {
    /// Wrap a manager.
    pub fn new(manager: Arc<TapManager>) -> Self {
        Self { manager }
    }
}

/// Query parameters for `GET /taps`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Id of the last entry of the previous page. Empty means first page.
    pub cursor: Option<String>,
}

/// Response body of `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    /// Always `"ok"` when the daemon answers.
    pub status: String,
    /// Persisted taps.
    pub taps: usize,
    /// Taps with a live runner.
    pub taps_running: usize,
    /// Server time, RFC 3339.
    pub time: String,
}

/// An API error with HTTP status code and message.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status code.
    pub status: StatusCode,
    /// Human-readable error message.
    pub message: String,
}

impl ApiError {
    /// Create a new `ApiError` with the given status and message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        let status = match &err {
            ManagerError::Invalid(_) => StatusCode::BAD_REQUEST,
            ManagerError::NotFound(_) => StatusCode::NOT_FOUND,
            ManagerError::Storage(_) | ManagerError::Start(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

/// Build the Axum router with all daemon routes.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/taps", get(cmd_list_taps).post(cmd_create_tap))
        .route("/taps/{id}", get(cmd_get_tap).delete(cmd_delete_tap))
        .with_state(state)
        .layer(from_fn(middleware::RequestLogger::layer))
        .layer(from_fn(middleware::request_id_middleware))
}

async fn cmd_health(State(state): State<AppState>) -> Result<Json<Health>, ApiError> {
    let taps = state.manager.count().await.map_err(|e| {
        error!(target: "etap.daemon", error = %e, "health check could not read the registry");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(Json(Health {
        status: "ok".into(),
        taps,
        taps_running: state.manager.running_count(),
        time: Utc::now().to_rfc3339(),
    }))
}

async fn cmd_create_tap(
    State(state): State<AppState>,
    payload: Result<Json<TapOptions>, JsonRejection>,
) -> Result<(StatusCode, Json<TapId>), ApiError> {
    let Json(options) = payload.map_err(|rejection| {
        warn!(
            target: "etap.daemon",
            error = %rejection.body_text(),
            "could not decode tap options"
        );
        ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("could not decode options: {}", rejection.body_text()),
        )
    })?;

    let name = options.name.clone();
    let id = state.manager.create(options).await.map_err(|e| {
        match &e {
            ManagerError::Invalid(_) => {
                warn!(
                    target: "etap.daemon",
                    tap_name = %name,
                    error = %e,
                    "rejected tap definition"
                );
            }
            _ => {
                error!(
                    target: "etap.daemon",
                    tap_name = %name,
                    error = %e,
                    "could not create tap"
                );
            }
        }
        ApiError::from(e)
    })?;

    info!(target: "etap.daemon", tap_id = %id, tap_name = %name, "tap created");
    Ok((StatusCode::CREATED, Json(TapId { id })))
}

async fn cmd_list_taps(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<TapListPage>, ApiError> {
    let cursor = q.cursor.as_deref().filter(|c| !c.is_empty());
    let page = state.manager.list(cursor).await.map_err(|e| {
        error!(target: "etap.daemon", error = %e, "could not list taps");
        ApiError::from(e)
    })?;
    Ok(Json(page))
}

async fn cmd_get_tap(
    State(state): State<AppState>,
    AxPath(id): AxPath<String>,
) -> Result<Json<TapDetails>, ApiError> {
    match state.manager.get(&id).await {
        Ok(Some(details)) => Ok(Json(details)),
        Ok(None) => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("tap {id} not found"),
        )),
        Err(e) => {
            error!(target: "etap.daemon", tap_id = %id, error = %e, "could not read tap");
            Err(e.into())
        }
    }
}

async fn cmd_delete_tap(
    State(state): State<AppState>,
    AxPath(id): AxPath<String>,
) -> Result<StatusCode, ApiError> {
    state.manager.delete(&id).await.map_err(|e| {
        match &e {
            ManagerError::NotFound(_) => {
                warn!(target: "etap.daemon", tap_id = %id, "tap not found");
            }
            _ => error!(target: "etap.daemon", tap_id = %id, error = %e, "could not delete tap"),
        }
        ApiError::from(e)
    })?;
    info!(target: "etap.daemon", tap_id = %id, "tap deleted");
    Ok(StatusCode::NO_CONTENT)
}
