//! Database models mapping to the metadata schema.

use depot_core::session::{SessionStatus, UploadSession, UploadVariant};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record. Assignments must reference an existing user.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub username: String,
    pub is_admin: bool,
    pub created_at: OffsetDateTime,
}

/// Logical file record.
///
/// `storage_key` must resolve to exactly one blob in the object store; the
/// reconciler restores this invariant when it is violated.
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub file_id: Uuid,
    pub file_name: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub storage_key: String,
    /// Hex SHA-256 of the blob content, recorded at reassembly.
    pub checksum: Option<String>,
    pub uploader_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

/// File-to-user assignment.
#[derive(Debug, Clone, FromRow)]
pub struct FileAssignmentRow {
    pub file_id: Uuid,
    pub user_id: Uuid,
    pub assigned_at: OffsetDateTime,
}

/// Upload session record.
#[derive(Debug, Clone, FromRow)]
pub struct UploadSessionRow {
    pub session_id: Uuid,
    pub file_name: String,
    pub declared_size: i64,
    pub mime_type: String,
    pub variant: String,
    pub chunk_size: i64,
    pub total_chunks: i64,
    pub status: String,
    pub created_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
}

impl UploadSessionRow {
    /// Build a row from a domain session.
    pub fn from_session(session: &UploadSession) -> Self {
        Self {
            session_id: *session.id.as_uuid(),
            file_name: session.file_name.clone(),
            declared_size: session.declared_size as i64,
            mime_type: session.mime_type.clone(),
            variant: session.variant.as_str().to_string(),
            chunk_size: session.chunk_size as i64,
            total_chunks: session.total_chunks as i64,
            status: session.status.as_str().to_string(),
            created_at: session.created_at,
            completed_at: session.completed_at,
        }
    }

    /// Convert back to a domain session.
    pub fn to_session(&self) -> depot_core::Result<UploadSession> {
        Ok(UploadSession {
            id: self.session_id.into(),
            file_name: self.file_name.clone(),
            declared_size: self.declared_size as u64,
            mime_type: self.mime_type.clone(),
            variant: UploadVariant::parse(&self.variant)?,
            chunk_size: self.chunk_size as u64,
            total_chunks: self.total_chunks as u64,
            status: SessionStatus::parse(&self.status)?,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

/// One received chunk of an upload session.
#[derive(Debug, Clone, FromRow)]
pub struct SessionChunkRow {
    pub session_id: Uuid,
    pub chunk_index: i64,
    pub size_bytes: i64,
    pub received_at: OffsetDateTime,
}
