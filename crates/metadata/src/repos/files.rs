//! Logical file and assignment repositories.

use crate::error::MetadataResult;
use crate::models::FileRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Logical file records.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Insert a new file record.
    async fn insert_file(&self, file: &FileRow) -> MetadataResult<()>;

    /// Fetch a file by ID.
    async fn get_file(&self, file_id: Uuid) -> MetadataResult<Option<FileRow>>;

    /// List all file records.
    async fn list_files(&self) -> MetadataResult<Vec<FileRow>>;

    /// List files assigned to a user.
    async fn list_files_for_user(&self, user_id: Uuid) -> MetadataResult<Vec<FileRow>>;

    /// Overwrite a file's recorded size. Fails with `NotFound` for an
    /// unknown file.
    async fn update_file_size(&self, file_id: Uuid, size_bytes: i64) -> MetadataResult<()>;

    /// Delete a file record and its assignment rows in one transaction:
    /// assignments first, then the file row. If the file row deletes zero
    /// rows the transaction rolls back and `NotFound` is returned.
    async fn delete_file_transactional(&self, file_id: Uuid) -> MetadataResult<()>;
}

/// File-to-user assignments.
#[async_trait]
pub trait AssignmentRepo: Send + Sync {
    /// Assign a file to a set of users. Idempotent per (file, user) pair.
    async fn assign_file_to_users(&self, file_id: Uuid, user_ids: &[Uuid]) -> MetadataResult<()>;

    /// List the users a file is assigned to.
    async fn list_assignees(&self, file_id: Uuid) -> MetadataResult<Vec<Uuid>>;
}
