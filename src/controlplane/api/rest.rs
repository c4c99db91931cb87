//! REST API Handlers
//!
//! Implements the REST API endpoints for volume provisioning, status and
//! removal.

use crate::domain::claim::VolumeClaim;
use crate::error::Error;
use crate::provisioning::Provisioner;
use axum::{
    extract::{rejection::JsonRejection, Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

// =============================================================================
// Response Types
// =============================================================================

/// Volume removal response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveVolumeResponse {
    pub name: String,
    pub eval_id: String,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    provisioner: Arc<Provisioner>,
}

impl RestRouter {
    /// Create a new REST router
    pub fn new(provisioner: Arc<Provisioner>) -> Self {
        Self { provisioner }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            provisioner: self.provisioner,
        };

        Router::new()
            // Volume endpoints
            .route("/latest/volumes", post(provision_volume))
            .route(
                "/latest/volumes/:name",
                get(volume_status).delete(remove_volume),
            )
            // Health endpoint
            .route("/health", get(health_check))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    provisioner: Arc<Provisioner>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Provision a volume
async fn provision_volume(
    State(state): State<AppState>,
    payload: Result<Json<VolumeClaim>, JsonRejection>,
) -> Response {
    let Json(claim) = match payload {
        Ok(claim) => claim,
        Err(rejection) => return rejection_response(&rejection),
    };
    info!("Provision request for volume {}", claim.name);

    match state.provisioner.provision(claim).await {
        Ok(status) => (StatusCode::CREATED, Json(status)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Current status of a volume
async fn volume_status(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.provisioner.status(&name).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Remove a volume
async fn remove_volume(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.provisioner.remove(&name).await {
        Ok(handle) => (
            StatusCode::OK,
            Json(RemoveVolumeResponse {
                name: handle.job_id,
                eval_id: handle.eval_id,
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Health check; reports the orchestrator's reachability
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.provisioner.health_check().await {
        Ok(true) => (StatusCode::OK, "ok"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "orchestrator unreachable"),
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

/// HTTP status and error code for a provisioning error
pub fn status_for(err: &Error) -> (StatusCode, &'static str) {
    match err {
        Error::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        Error::AddressPoolExhausted { .. } | Error::AddressInUse { .. } => {
            (StatusCode::CONFLICT, "address_conflict")
        }
        e if e.is_claim_error() => (StatusCode::BAD_REQUEST, "invalid_claim"),
        e if e.is_retryable() => (StatusCode::BAD_GATEWAY, "backend_error"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

fn error_response(err: &Error) -> Response {
    let (status, code) = status_for(err);
    if status.is_server_error() {
        error!("Request failed: {}", err);
    }
    (
        status,
        Json(ApiErrorResponse {
            error: code.to_string(),
            message: err.to_string(),
        }),
    )
        .into_response()
}

/// Claim bodies that cannot be decoded are claim errors too
fn rejection_response(rejection: &JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiErrorResponse {
            error: "invalid_claim".to_string(),
            message: rejection.body_text(),
        }),
    )
        .into_response()
}
