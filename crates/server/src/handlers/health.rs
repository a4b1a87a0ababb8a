//! Health check handler.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: &'static str,
    pub storage_backend: &'static str,
}

/// GET /v1/health - Verify storage and metadata connectivity.
///
/// Intentionally unauthenticated for load balancers and probes.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state
        .storage
        .health_check()
        .await
        .map_err(|e| ApiError::Internal(format!("storage health check failed: {e}")))?;
    state
        .metadata
        .health_check()
        .await
        .map_err(|e| ApiError::Internal(format!("metadata health check failed: {e}")))?;

    Ok(Json(HealthResponse {
        success: true,
        status: "ok",
        storage_backend: state.storage.backend_name(),
    }))
}
