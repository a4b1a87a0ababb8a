//! Admin handlers: consistency reconciliation and file deletion.

use crate::auth::require_identity;
use crate::deletion::{self, DeletionOutcome};
use crate::error::ApiResult;
use crate::reconcile::{self, ReconcileOptions, ReconciliationReport};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::Extensions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for a reconciliation pass.
#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    /// Delete orphaned blobs from storage. Deleting storage data is never
    /// an implicit side effect; it must be opted into per call.
    #[serde(default)]
    pub delete_orphans: bool,
}

/// Reconciliation pass summary plus the itemized report.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub orphaned_count: usize,
    pub missing_count: usize,
    pub size_corrected_count: usize,
    pub deleted_orphan_count: usize,
    pub error_count: usize,
    #[serde(flatten)]
    pub report: ReconciliationReport,
}

/// POST /v1/admin/sync - Run a reconciliation pass (admin only).
///
/// Always answers 200 with a full report; individual record failures are
/// itemized under `errors` rather than failing the pass.
#[tracing::instrument(skip(state, extensions, body))]
pub async fn sync(
    State(state): State<AppState>,
    extensions: Extensions,
    body: Option<Json<SyncRequest>>,
) -> ApiResult<Json<SyncResponse>> {
    let identity = require_identity(&extensions)?;
    identity.require_admin()?;

    let request = body.map(|Json(b)| b).unwrap_or_default();
    let report = reconcile::reconcile(
        state.storage.as_ref(),
        state.metadata.as_ref(),
        ReconcileOptions {
            delete_orphans: request.delete_orphans,
        },
    )
    .await?;

    Ok(Json(SyncResponse {
        success: true,
        orphaned_count: report.orphaned_count(),
        missing_count: report.missing_count(),
        size_corrected_count: report.size_corrected_count(),
        deleted_orphan_count: report.deleted_orphan_count(),
        error_count: report.errors.len(),
        report,
    }))
}

/// Request body for file deletion.
#[derive(Debug, Deserialize)]
pub struct DeleteFileRequest {
    pub file_id: Uuid,
}

/// Composite deletion result.
#[derive(Debug, Serialize)]
pub struct DeleteFileResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: DeletionOutcome,
}

/// DELETE /v1/admin/files - Delete a logical file (admin only).
#[tracing::instrument(skip(state, extensions, body), fields(file_id = %body.file_id))]
pub async fn delete_file(
    State(state): State<AppState>,
    extensions: Extensions,
    Json(body): Json<DeleteFileRequest>,
) -> ApiResult<Json<DeleteFileResponse>> {
    let identity = require_identity(&extensions)?;
    identity.require_admin()?;

    let outcome = deletion::delete_file(
        state.storage.as_ref(),
        state.metadata.as_ref(),
        body.file_id,
        state.delete_retry_policy(),
    )
    .await?;

    Ok(Json(DeleteFileResponse {
        success: true,
        outcome,
    }))
}
