//! Chunk reassembly engine.
//!
//! Concatenates a session's chunks in strict index order into one durable
//! blob, then releases the per-chunk and per-session state. Source chunks
//! are never deleted until the destination write has been acknowledged.

use crate::error::{ApiError, ApiResult};
use bytes::BytesMut;
use depot_core::keys;
use depot_core::session::UploadSession;
use depot_metadata::MetadataStore;
use depot_storage::{ObjectStore, StorageError};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// Result of a successful reassembly.
///
/// The engine does not write the logical-file metadata record; the caller
/// inserts it after this returns.
#[derive(Clone, Debug)]
pub struct ReassembledFile {
    /// Key of the assembled blob, under the `files/` namespace.
    pub storage_key: String,
    /// Original file name.
    pub file_name: String,
    /// Declared MIME type carried over from the session.
    pub mime_type: String,
    /// Total assembled size in bytes.
    pub total_size: u64,
    /// Number of chunks that were concatenated.
    pub chunk_count: u64,
    /// Hex SHA-256 of the assembled content.
    pub checksum: String,
}

/// Reassemble a session's chunks into one blob.
///
/// Preconditions: every chunk index 0..total_chunks must have been received.
/// `enforce_declared_size` additionally requires the assembled length to
/// equal the session's declared size (the eager path); the lazy combine
/// path trusts chunk accounting alone.
#[tracing::instrument(skip(storage, metadata, session), fields(session_id = %session.id))]
pub async fn reassemble(
    storage: &dyn ObjectStore,
    metadata: &dyn MetadataStore,
    session: &UploadSession,
    enforce_declared_size: bool,
) -> ApiResult<ReassembledFile> {
    let session_id = session.id;
    let uploaded = metadata
        .count_received_chunks(*session_id.as_uuid())
        .await?;
    if uploaded != session.total_chunks {
        return Err(ApiError::IncompleteUpload {
            uploaded,
            total: session.total_chunks,
        });
    }

    // Fetch in index order, not arrival order. A key that vanished between
    // the count check and here is a storage inconsistency, distinct from an
    // incomplete upload.
    let mut assembled = BytesMut::with_capacity(session.declared_size as usize);
    for index in 0..session.total_chunks {
        let key = keys::chunk_key(session_id, index);
        let chunk = match storage.get(&key).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => {
                return Err(ApiError::MissingChunk {
                    session_id: session_id.to_string(),
                    index,
                });
            }
            Err(e) => return Err(e.into()),
        };
        assembled.extend_from_slice(&chunk);
    }

    let total_size = assembled.len() as u64;
    if enforce_declared_size && total_size != session.declared_size {
        return Err(ApiError::BadRequest(format!(
            "assembled size {} does not match declared size {} for session {}",
            total_size, session.declared_size, session_id
        )));
    }

    let checksum = hex_digest(&assembled);
    let storage_key = keys::file_key(OffsetDateTime::now_utc(), &session.file_name);

    // Durably persist the assembled blob before touching any chunk.
    storage.put(&storage_key, assembled.freeze()).await?;

    tracing::info!(
        session_id = %session_id,
        storage_key = %storage_key,
        total_size,
        chunk_count = session.total_chunks,
        "Assembled file persisted"
    );

    // Release per-chunk storage. A failed chunk delete leaves a stray blob
    // in the chunks/ namespace; it cannot be mistaken for a file.
    for index in 0..session.total_chunks {
        let key = keys::chunk_key(session_id, index);
        if let Err(e) = storage.delete(&key).await {
            if !e.is_not_found() {
                tracing::warn!(
                    session_id = %session_id,
                    key = %key,
                    error = %e,
                    "Failed to delete chunk after reassembly"
                );
            }
        }
    }

    metadata.delete_session(*session_id.as_uuid()).await?;

    crate::metrics::FILES_ASSEMBLED.inc();

    Ok(ReassembledFile {
        storage_key,
        file_name: session.file_name.clone(),
        mime_type: session.mime_type.clone(),
        total_size,
        chunk_count: session.total_chunks,
        checksum,
    })
}

fn hex_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}
