//! Upload session repository.
//!
//! The session store backs the chunk session manager's state machine.
//! Progress is always derived from the distinct set of received chunk
//! indices, never from an incrementing counter, so re-delivery of a chunk
//! cannot inflate the count.

use crate::error::MetadataResult;
use crate::models::{SessionChunkRow, UploadSessionRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

#[async_trait]
pub trait SessionRepo: Send + Sync {
    /// Persist a new upload session.
    async fn create_session(&self, session: &UploadSessionRow) -> MetadataResult<()>;

    /// Fetch a session by ID.
    async fn get_session(&self, session_id: Uuid) -> MetadataResult<Option<UploadSessionRow>>;

    /// Record one received chunk. Upserts on (session_id, chunk_index):
    /// re-recording an index overwrites its size and timestamp without
    /// creating a second row.
    async fn record_chunk(
        &self,
        session_id: Uuid,
        chunk_index: i64,
        size_bytes: i64,
        received_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Count of distinct chunk indices received so far.
    async fn count_received_chunks(&self, session_id: Uuid) -> MetadataResult<u64>;

    /// All received chunks, ordered by index.
    async fn list_received_chunks(&self, session_id: Uuid)
    -> MetadataResult<Vec<SessionChunkRow>>;

    /// Whether a specific chunk index has been received.
    async fn has_chunk(&self, session_id: Uuid, chunk_index: i64) -> MetadataResult<bool>;

    /// Set the session status to completed. Advisory only; does not verify
    /// chunk completeness. Fails with `NotFound` for an unknown session.
    async fn mark_completed(
        &self,
        session_id: Uuid,
        completed_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Delete a session and its chunk rows in one transaction.
    async fn delete_session(&self, session_id: Uuid) -> MetadataResult<()>;
}
