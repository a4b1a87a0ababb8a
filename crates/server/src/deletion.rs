//! Deletion coordinator.
//!
//! Removes one logical file's blob and metadata record despite the two
//! stores not sharing a transaction. Blob deletion is best-effort with a
//! bounded settle-and-recheck; metadata deletion is guaranteed regardless.
//! A dangling metadata pointer breaks user-facing downloads, while an
//! orphaned blob only costs storage until reconciliation collects it.

use crate::error::{ApiError, ApiResult};
use crate::retry::RetryPolicy;
use depot_metadata::MetadataStore;
use depot_storage::{ObjectStore, StorageError};
use serde::Serialize;
use uuid::Uuid;

/// Composite result of deleting a logical file.
#[derive(Clone, Debug, Serialize)]
pub struct DeletionOutcome {
    /// The file that was deleted.
    pub file_id: Uuid,
    /// The storage key that was targeted, if the record had one.
    pub storage_key: Option<String>,
    /// Whether the blob is gone (true also when there was nothing to
    /// delete).
    pub blob_deleted: bool,
    /// Whether the blob existed before the pass.
    pub blob_existed_before: bool,
    /// Whether the blob still existed after the final attempt.
    pub blob_existed_after: bool,
}

/// Delete a logical file: blob first (best effort), then metadata
/// (guaranteed, transactional with its assignments).
#[tracing::instrument(skip(storage, metadata, policy), fields(file_id = %file_id))]
pub async fn delete_file(
    storage: &dyn ObjectStore,
    metadata: &dyn MetadataStore,
    file_id: Uuid,
    policy: RetryPolicy,
) -> ApiResult<DeletionOutcome> {
    let record = metadata
        .get_file(file_id)
        .await?
        .ok_or_else(|| ApiError::FileNotFound(file_id.to_string()))?;

    let mut outcome = DeletionOutcome {
        file_id,
        storage_key: None,
        blob_deleted: true,
        blob_existed_before: false,
        blob_existed_after: false,
    };

    if record.storage_key.is_empty() {
        // No storage key at all: nothing to delete on the blob side.
        tracing::debug!(file_id = %file_id, "Record has no storage key, skipping blob deletion");
    } else {
        outcome.storage_key = Some(record.storage_key.clone());
        let (deleted, existed_before, existed_after) =
            delete_blob_settled(storage, &record.storage_key, policy).await;
        outcome.blob_deleted = deleted;
        outcome.blob_existed_before = existed_before;
        outcome.blob_existed_after = existed_after;

        if !deleted {
            tracing::warn!(
                file_id = %file_id,
                storage_key = %record.storage_key,
                "Blob still present after delete attempts; proceeding with metadata removal"
            );
        }
    }

    // Metadata removal is never blocked by the blob outcome.
    metadata.delete_file_transactional(file_id).await?;
    crate::metrics::FILES_DELETED.inc();

    tracing::info!(
        file_id = %file_id,
        blob_deleted = outcome.blob_deleted,
        "Logical file deleted"
    );

    Ok(outcome)
}

/// Best-effort blob deletion with settle-and-recheck confirmation.
///
/// Returns (deleted, existed_before, existed_after). An absent blob counts
/// as already deleted. Storage errors during the loop are logged and leave
/// the blob to a later attempt or the reconciler; they never propagate.
async fn delete_blob_settled(
    storage: &dyn ObjectStore,
    key: &str,
    policy: RetryPolicy,
) -> (bool, bool, bool) {
    let existed_before = match storage.exists(key).await {
        Ok(exists) => exists,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Existence check failed before blob delete");
            // Assume present and attempt deletion anyway.
            true
        }
    };

    if !existed_before {
        return (true, false, false);
    }

    let mut existed_after = true;
    for attempt in 1..=policy.max_attempts() {
        match storage.delete(key).await {
            Ok(()) => {}
            Err(StorageError::NotFound(_)) => {
                // Someone else removed it between checks; that is success.
                return (true, true, false);
            }
            Err(e) => {
                tracing::warn!(key = %key, attempt, error = %e, "Blob delete failed");
            }
        }

        // Give eventually-consistent storage a moment before confirming.
        policy.settle().await;

        existed_after = match storage.exists(key).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!(key = %key, attempt, error = %e, "Existence re-check failed after blob delete");
                true
            }
        };

        if !existed_after {
            return (true, true, false);
        }
    }

    (false, true, existed_after)
}
