//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{AssignmentRepo, FileRepo, SessionRepo, UserRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: UserRepo + FileRepo + AssignmentRepo + SessionRepo + Send + Sync {
    /// Apply the embedded schema.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if missing) a SQLite store at the given path.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MetadataError::Internal(format!("create db directory: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))
            .map_err(MetadataError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Avoid transient "database is locked" errors under concurrency.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent lock failures under handler concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    fn map_insert_error(e: sqlx::Error, what: &str) -> MetadataError {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.message().contains("UNIQUE constraint") {
                return MetadataError::AlreadyExists(what.to_string());
            }
            if db_err.message().contains("FOREIGN KEY constraint") {
                return MetadataError::Constraint(format!("{what}: foreign key violation"));
            }
        }
        MetadataError::Database(e)
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Repository implementations for SqliteStore.
mod sqlite_impl {
    use super::*;
    use crate::models::{FileRow, SessionChunkRow, UploadSessionRow, UserRow};
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl UserRepo for SqliteStore {
        async fn create_user(&self, user: &UserRow) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO users (user_id, username, is_admin, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(user.user_id)
            .bind(&user.username)
            .bind(user.is_admin)
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::map_insert_error(e, &format!("user '{}'", user.username)))?;
            Ok(())
        }

        async fn get_user(&self, user_id: Uuid) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_users(&self) -> MetadataResult<Vec<UserRow>> {
            let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY username")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl FileRepo for SqliteStore {
        async fn insert_file(&self, file: &FileRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO files (
                    file_id, file_name, size_bytes, mime_type, storage_key,
                    checksum, uploader_id, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(file.file_id)
            .bind(&file.file_name)
            .bind(file.size_bytes)
            .bind(&file.mime_type)
            .bind(&file.storage_key)
            .bind(&file.checksum)
            .bind(file.uploader_id)
            .bind(file.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::map_insert_error(e, &format!("file {}", file.file_id)))?;
            Ok(())
        }

        async fn get_file(&self, file_id: Uuid) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE file_id = ?")
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_files(&self) -> MetadataResult<Vec<FileRow>> {
            let rows = sqlx::query_as::<_, FileRow>("SELECT * FROM files ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn list_files_for_user(&self, user_id: Uuid) -> MetadataResult<Vec<FileRow>> {
            let rows = sqlx::query_as::<_, FileRow>(
                r#"
                SELECT f.* FROM files f
                JOIN file_assignments a ON a.file_id = f.file_id
                WHERE a.user_id = ?
                ORDER BY f.created_at
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn update_file_size(&self, file_id: Uuid, size_bytes: i64) -> MetadataResult<()> {
            let result = sqlx::query("UPDATE files SET size_bytes = ? WHERE file_id = ?")
                .bind(size_bytes)
                .bind(file_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("file {file_id}")));
            }
            Ok(())
        }

        async fn delete_file_transactional(&self, file_id: Uuid) -> MetadataResult<()> {
            // Assignments first, then the file row. Dropping the transaction
            // without commit rolls both back when the file row is absent.
            let mut tx = self.pool.begin().await?;

            sqlx::query("DELETE FROM file_assignments WHERE file_id = ?")
                .bind(file_id)
                .execute(&mut *tx)
                .await?;

            let result = sqlx::query("DELETE FROM files WHERE file_id = ?")
                .bind(file_id)
                .execute(&mut *tx)
                .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(MetadataError::NotFound(format!("file {file_id}")));
            }

            tx.commit().await?;
            Ok(())
        }
    }

    #[async_trait]
    impl AssignmentRepo for SqliteStore {
        async fn assign_file_to_users(
            &self,
            file_id: Uuid,
            user_ids: &[Uuid],
        ) -> MetadataResult<()> {
            let now = OffsetDateTime::now_utc();
            let mut tx = self.pool.begin().await?;
            for user_id in user_ids {
                sqlx::query(
                    r#"
                    INSERT INTO file_assignments (file_id, user_id, assigned_at)
                    VALUES (?, ?, ?)
                    ON CONFLICT(file_id, user_id) DO NOTHING
                    "#,
                )
                .bind(file_id)
                .bind(user_id)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    Self::map_insert_error(e, &format!("assignment {file_id} -> {user_id}"))
                })?;
            }
            tx.commit().await?;
            Ok(())
        }

        async fn list_assignees(&self, file_id: Uuid) -> MetadataResult<Vec<Uuid>> {
            let rows: Vec<(Uuid,)> = sqlx::query_as(
                "SELECT user_id FROM file_assignments WHERE file_id = ? ORDER BY assigned_at",
            )
            .bind(file_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(|(id,)| id).collect())
        }
    }

    #[async_trait]
    impl SessionRepo for SqliteStore {
        async fn create_session(&self, session: &UploadSessionRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO upload_sessions (
                    session_id, file_name, declared_size, mime_type, variant,
                    chunk_size, total_chunks, status, created_at, completed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(session.session_id)
            .bind(&session.file_name)
            .bind(session.declared_size)
            .bind(&session.mime_type)
            .bind(&session.variant)
            .bind(session.chunk_size)
            .bind(session.total_chunks)
            .bind(&session.status)
            .bind(session.created_at)
            .bind(session.completed_at)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::map_insert_error(e, &format!("session {}", session.session_id)))?;
            Ok(())
        }

        async fn get_session(
            &self,
            session_id: Uuid,
        ) -> MetadataResult<Option<UploadSessionRow>> {
            let row = sqlx::query_as::<_, UploadSessionRow>(
                "SELECT * FROM upload_sessions WHERE session_id = ?",
            )
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn record_chunk(
            &self,
            session_id: Uuid,
            chunk_index: i64,
            size_bytes: i64,
            received_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO session_chunks (session_id, chunk_index, size_bytes, received_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(session_id, chunk_index)
                DO UPDATE SET size_bytes = excluded.size_bytes,
                              received_at = excluded.received_at
                "#,
            )
            .bind(session_id)
            .bind(chunk_index)
            .bind(size_bytes)
            .bind(received_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Self::map_insert_error(e, &format!("chunk {chunk_index} of {session_id}"))
            })?;
            Ok(())
        }

        async fn count_received_chunks(&self, session_id: Uuid) -> MetadataResult<u64> {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM session_chunks WHERE session_id = ?")
                    .bind(session_id)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count as u64)
        }

        async fn list_received_chunks(
            &self,
            session_id: Uuid,
        ) -> MetadataResult<Vec<SessionChunkRow>> {
            let rows = sqlx::query_as::<_, SessionChunkRow>(
                "SELECT * FROM session_chunks WHERE session_id = ? ORDER BY chunk_index",
            )
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn has_chunk(&self, session_id: Uuid, chunk_index: i64) -> MetadataResult<bool> {
            let row: Option<(i32,)> = sqlx::query_as(
                "SELECT 1 FROM session_chunks WHERE session_id = ? AND chunk_index = ?",
            )
            .bind(session_id)
            .bind(chunk_index)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.is_some())
        }

        async fn mark_completed(
            &self,
            session_id: Uuid,
            completed_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE upload_sessions SET status = 'completed', completed_at = ? WHERE session_id = ?",
            )
            .bind(completed_at)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("session {session_id}")));
            }
            Ok(())
        }

        async fn delete_session(&self, session_id: Uuid) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            sqlx::query("DELETE FROM session_chunks WHERE session_id = ?")
                .bind(session_id)
                .execute(&mut *tx)
                .await?;

            sqlx::query("DELETE FROM upload_sessions WHERE session_id = ?")
                .bind(session_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(())
        }
    }
}

/// Embedded SQLite schema applied by `migrate()`.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id BLOB PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    is_admin INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS files (
    file_id BLOB PRIMARY KEY,
    file_name TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    mime_type TEXT NOT NULL,
    storage_key TEXT NOT NULL,
    checksum TEXT,
    uploader_id BLOB,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS file_assignments (
    file_id BLOB NOT NULL,
    user_id BLOB NOT NULL,
    assigned_at TEXT NOT NULL,
    PRIMARY KEY (file_id, user_id),
    FOREIGN KEY (file_id) REFERENCES files(file_id),
    FOREIGN KEY (user_id) REFERENCES users(user_id)
);

CREATE TABLE IF NOT EXISTS upload_sessions (
    session_id BLOB PRIMARY KEY,
    file_name TEXT NOT NULL,
    declared_size INTEGER NOT NULL,
    mime_type TEXT NOT NULL,
    variant TEXT NOT NULL,
    chunk_size INTEGER NOT NULL,
    total_chunks INTEGER NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE TABLE IF NOT EXISTS session_chunks (
    session_id BLOB NOT NULL,
    chunk_index INTEGER NOT NULL,
    size_bytes INTEGER NOT NULL,
    received_at TEXT NOT NULL,
    PRIMARY KEY (session_id, chunk_index)
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileRow, UploadSessionRow, UserRow};
    use depot_core::session::{UploadSession, UploadVariant};
    use time::OffsetDateTime;
    use uuid::Uuid;

    async fn open_store() -> (tempfile::TempDir, SqliteStore) {
        let temp = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(temp.path().join("metadata.db"))
            .await
            .unwrap();
        (temp, store)
    }

    fn sample_user(name: &str) -> UserRow {
        UserRow {
            user_id: Uuid::new_v4(),
            username: name.to_string(),
            is_admin: false,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn sample_file(key: &str) -> FileRow {
        FileRow {
            file_id: Uuid::new_v4(),
            file_name: "report.pdf".to_string(),
            size_bytes: 1000,
            mime_type: "application/pdf".to_string(),
            storage_key: key.to_string(),
            checksum: None,
            uploader_id: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn sample_session() -> UploadSessionRow {
        let session = UploadSession::new("a.bin", 100, "text/plain", UploadVariant::Lazy, 30);
        UploadSessionRow::from_session(&session)
    }

    #[tokio::test]
    async fn test_user_crud() {
        let (_temp, store) = open_store().await;
        let user = sample_user("alice");
        store.create_user(&user).await.unwrap();

        let fetched = store.get_user(user.user_id).await.unwrap().unwrap();
        assert_eq!(fetched.username, "alice");

        // Duplicate username is rejected.
        let mut dup = sample_user("alice");
        dup.user_id = Uuid::new_v4();
        match store.create_user(&dup).await {
            Err(MetadataError::AlreadyExists(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_record_chunk_is_idempotent() {
        let (_temp, store) = open_store().await;
        let session = sample_session();
        store.create_session(&session).await.unwrap();

        let now = OffsetDateTime::now_utc();
        store.record_chunk(session.session_id, 0, 30, now).await.unwrap();
        store.record_chunk(session.session_id, 0, 30, now).await.unwrap();
        store.record_chunk(session.session_id, 2, 30, now).await.unwrap();

        assert_eq!(store.count_received_chunks(session.session_id).await.unwrap(), 2);
        assert!(store.has_chunk(session.session_id, 0).await.unwrap());
        assert!(!store.has_chunk(session.session_id, 1).await.unwrap());

        let chunks = store.list_received_chunks(session.session_id).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[1].chunk_index, 2);
    }

    #[tokio::test]
    async fn test_delete_session_removes_chunk_rows() {
        let (_temp, store) = open_store().await;
        let session = sample_session();
        store.create_session(&session).await.unwrap();
        store
            .record_chunk(session.session_id, 0, 30, OffsetDateTime::now_utc())
            .await
            .unwrap();

        store.delete_session(session.session_id).await.unwrap();
        assert!(store.get_session(session.session_id).await.unwrap().is_none());
        assert_eq!(store.count_received_chunks(session.session_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_completed_unknown_session() {
        let (_temp, store) = open_store().await;
        let err = store
            .mark_completed(Uuid::new_v4(), OffsetDateTime::now_utc())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_file_transactional_removes_assignments() {
        let (_temp, store) = open_store().await;
        let user = sample_user("bob");
        store.create_user(&user).await.unwrap();
        let file = sample_file("files/1-report.pdf");
        store.insert_file(&file).await.unwrap();
        store
            .assign_file_to_users(file.file_id, &[user.user_id])
            .await
            .unwrap();

        store.delete_file_transactional(file.file_id).await.unwrap();
        assert!(store.get_file(file.file_id).await.unwrap().is_none());
        assert!(store.list_assignees(file.file_id).await.unwrap().is_empty());
        assert!(store.list_files_for_user(user.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_file_transactional_unknown_file() {
        let (_temp, store) = open_store().await;
        let err = store
            .delete_file_transactional(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_assignment_idempotent_and_listing() {
        let (_temp, store) = open_store().await;
        let alice = sample_user("alice");
        let bob = sample_user("bob");
        store.create_user(&alice).await.unwrap();
        store.create_user(&bob).await.unwrap();
        let file = sample_file("files/2-report.pdf");
        store.insert_file(&file).await.unwrap();

        store
            .assign_file_to_users(file.file_id, &[alice.user_id, bob.user_id])
            .await
            .unwrap();
        store
            .assign_file_to_users(file.file_id, &[alice.user_id])
            .await
            .unwrap();

        let assignees = store.list_assignees(file.file_id).await.unwrap();
        assert_eq!(assignees.len(), 2);

        let files = store.list_files_for_user(alice.user_id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_id, file.file_id);
    }

    #[tokio::test]
    async fn test_assignment_requires_existing_user() {
        let (_temp, store) = open_store().await;
        let file = sample_file("files/3-x");
        store.insert_file(&file).await.unwrap();

        match store
            .assign_file_to_users(file.file_id, &[Uuid::new_v4()])
            .await
        {
            Err(MetadataError::Constraint(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_file_size() {
        let (_temp, store) = open_store().await;
        let file = sample_file("files/4-x");
        store.insert_file(&file).await.unwrap();

        store.update_file_size(file.file_id, 2048).await.unwrap();
        let fetched = store.get_file(file.file_id).await.unwrap().unwrap();
        assert_eq!(fetched.size_bytes, 2048);

        assert!(store.update_file_size(Uuid::new_v4(), 1).await.unwrap_err().is_not_found());
    }
}
