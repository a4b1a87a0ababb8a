//! Consistency reconciler.
//!
//! Repairs drift between the metadata store and the blob store: uploads,
//! deletes, and manual intervention can each partially fail on one side.
//! Only the `files/` namespace is examined; in-flight session chunks live
//! under `chunks/` and are invisible to this pass.

use crate::error::ApiResult;
use depot_core::keys::FILE_PREFIX;
use depot_metadata::MetadataStore;
use depot_storage::{ListingOptions, ListingResume, ObjectStore};
use futures::StreamExt;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Options for one reconciliation pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReconcileOptions {
    /// Delete orphaned blobs from storage. Off by default: a read-like pass
    /// must never destroy storage data implicitly.
    pub delete_orphans: bool,
}

/// A blob with no owning metadata record.
#[derive(Clone, Debug, Serialize)]
pub struct OrphanedBlob {
    pub storage_key: String,
    pub size_bytes: u64,
}

/// A metadata record whose blob does not exist.
#[derive(Clone, Debug, Serialize)]
pub struct MissingBlob {
    pub file_id: Uuid,
    pub file_name: String,
    pub storage_key: String,
}

/// A record whose recorded size disagreed with the blob's actual size.
#[derive(Clone, Debug, Serialize)]
pub struct SizeCorrection {
    pub file_id: Uuid,
    pub storage_key: String,
    pub recorded_size: i64,
    pub actual_size: u64,
}

/// A per-item failure captured during the pass.
#[derive(Clone, Debug, Serialize)]
pub struct ReconcileItemError {
    /// Storage key or file ID of the item that failed.
    pub item: String,
    pub error: String,
}

/// Full report of one reconciliation pass. Ephemeral, never persisted.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ReconciliationReport {
    pub orphaned_blobs: Vec<OrphanedBlob>,
    pub missing_blobs: Vec<MissingBlob>,
    pub size_corrected: Vec<SizeCorrection>,
    /// Keys of orphaned blobs actually deleted (only when opted in).
    pub deleted_orphans: Vec<String>,
    pub errors: Vec<ReconcileItemError>,
}

impl ReconciliationReport {
    pub fn orphaned_count(&self) -> usize {
        self.orphaned_blobs.len()
    }
    pub fn missing_count(&self) -> usize {
        self.missing_blobs.len()
    }
    pub fn size_corrected_count(&self) -> usize {
        self.size_corrected.len()
    }
    pub fn deleted_orphan_count(&self) -> usize {
        self.deleted_orphans.len()
    }
}

/// Run one reconciliation pass.
///
/// Individual record failures are collected into the report rather than
/// aborting the pass; only a failure to enumerate either store at all is a
/// hard error.
#[tracing::instrument(skip(storage, metadata, options))]
pub async fn reconcile(
    storage: &dyn ObjectStore,
    metadata: &dyn MetadataStore,
    options: ReconcileOptions,
) -> ApiResult<ReconciliationReport> {
    crate::metrics::RECONCILE_RUNS.inc();

    // Phase 1: accumulate the complete blob listing before comparing.
    // Continuation tokens are followed page by page; the comparison itself
    // runs over the full in-memory set.
    let blob_sizes = collect_file_blobs(storage).await?;

    // Phase 2: enumerate metadata records.
    let records = metadata.list_files().await?;

    let mut report = ReconciliationReport::default();

    // Phase 3: walk records, classifying missing blobs and size drift.
    let mut claimed: HashSet<&str> = HashSet::with_capacity(records.len());
    for record in &records {
        claimed.insert(record.storage_key.as_str());

        match blob_sizes.get(record.storage_key.as_str()) {
            None => {
                // Record claims a blob that does not exist: unrecoverable,
                // remove the record and its assignments outright.
                match metadata.delete_file_transactional(record.file_id).await {
                    Ok(()) => {
                        tracing::warn!(
                            file_id = %record.file_id,
                            storage_key = %record.storage_key,
                            "Removed metadata record with no backing blob"
                        );
                        report.missing_blobs.push(MissingBlob {
                            file_id: record.file_id,
                            file_name: record.file_name.clone(),
                            storage_key: record.storage_key.clone(),
                        });
                    }
                    Err(e) => {
                        report.errors.push(ReconcileItemError {
                            item: record.file_id.to_string(),
                            error: e.to_string(),
                        });
                    }
                }
            }
            Some(&actual_size) => {
                // Storage is ground truth for size.
                if record.size_bytes != actual_size as i64 {
                    match metadata
                        .update_file_size(record.file_id, actual_size as i64)
                        .await
                    {
                        Ok(()) => {
                            tracing::info!(
                                file_id = %record.file_id,
                                recorded = record.size_bytes,
                                actual = actual_size,
                                "Corrected recorded file size"
                            );
                            report.size_corrected.push(SizeCorrection {
                                file_id: record.file_id,
                                storage_key: record.storage_key.clone(),
                                recorded_size: record.size_bytes,
                                actual_size,
                            });
                        }
                        Err(e) => {
                            report.errors.push(ReconcileItemError {
                                item: record.file_id.to_string(),
                                error: e.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    // Phase 4: blobs with no owning record.
    for (key, &size) in &blob_sizes {
        if claimed.contains(key.as_str()) {
            continue;
        }
        report.orphaned_blobs.push(OrphanedBlob {
            storage_key: key.clone(),
            size_bytes: size,
        });

        if options.delete_orphans {
            match storage.delete(key).await {
                Ok(()) => {
                    tracing::info!(storage_key = %key, "Deleted orphaned blob");
                    crate::metrics::RECONCILE_ORPHANS_DELETED.inc();
                    report.deleted_orphans.push(key.clone());
                }
                Err(e) if e.is_not_found() => {
                    // Already gone; nothing to do.
                    report.deleted_orphans.push(key.clone());
                }
                Err(e) => {
                    report.errors.push(ReconcileItemError {
                        item: key.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    tracing::info!(
        orphaned = report.orphaned_count(),
        missing = report.missing_count(),
        size_corrected = report.size_corrected_count(),
        deleted_orphans = report.deleted_orphan_count(),
        errors = report.errors.len(),
        "Reconciliation pass finished"
    );

    Ok(report)
}

/// Accumulate every blob under the `files/` prefix into a key -> size map,
/// following continuation tokens across pages.
async fn collect_file_blobs(storage: &dyn ObjectStore) -> ApiResult<HashMap<String, u64>> {
    let mut sizes = HashMap::new();
    let mut resume: Option<ListingResume> = None;

    loop {
        let mut pages = storage.list_pages(FILE_PREFIX, ListingOptions::default(), resume.take());
        let mut last_token = None;
        while let Some(page) = pages.next().await {
            let page = page?;
            for entry in page.entries {
                sizes.insert(entry.key, entry.size);
            }
            last_token = page.next_token;
        }
        drop(pages);

        // Streams normally run to exhaustion in one go; a trailing token
        // means the backend ended the stream early and wants resumption.
        match last_token {
            Some(token) if storage.listing_capabilities().resumable => {
                resume = Some(ListingResume::new(token));
            }
            _ => break,
        }
    }

    Ok(sizes)
}
