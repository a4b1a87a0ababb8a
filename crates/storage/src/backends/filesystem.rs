//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    ListingCapabilities, ListingOptions, ListingPage, ListingResume, ObjectEntry, ObjectMeta,
    ObjectStore, SignedUrlDirection,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Local filesystem object store.
///
/// Keys map to paths below a fixed root; writes go through a temp file and
/// rename so readers never observe partial objects.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Map a key to its path, rejecting anything that could escape the root.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        if key.starts_with('/') || key.contains("..") || key.contains('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }
        // Every component must be a plain name. This also rejects ".",
        // absolute prefixes, and empty segments from doubled slashes.
        for component in Path::new(key).components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(StorageError::InvalidKey(format!(
                    "unsafe path component in key: {key}"
                )));
            }
        }
        Ok(self.root.join(key))
    }

    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Walk the tree below `prefix`, yielding (key, size) pairs.
    async fn walk(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        let base = if prefix.is_empty() {
            self.root.clone()
        } else {
            // A prefix may name a directory that does not exist yet; that is
            // an empty listing, not an error.
            self.key_path(prefix.trim_end_matches('/'))?
        };

        let mut entries = Vec::new();
        match fs::try_exists(&base).await {
            Ok(true) => {}
            Ok(false) => return Ok(entries),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(StorageError::Io(e)),
        }

        let mut stack = vec![base];
        while let Some(dir) = stack.pop() {
            let mut dir_entries = fs::read_dir(&dir).await?;
            while let Some(entry) = dir_entries.next_entry().await? {
                // file_type() does not follow symlinks, so links cannot pull
                // the walk outside the root.
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(entry.path());
                } else if file_type.is_file() {
                    let size = entry.metadata().await?.len();
                    if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                        entries.push(ObjectEntry {
                            key: rel.to_string_lossy().replace('\\', "/"),
                            size,
                        });
                    }
                }
            }
        }

        Ok(entries)
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key)?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.key_path(key)?;
        let metadata = fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(ObjectMeta {
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(|t| t.into()),
            content_type: None,
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key)?;
        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(key)?;
        self.ensure_parent(&path).await?;

        // Unique temp name so concurrent writers of the same key cannot
        // clobber each other's staging file; last rename wins.
        let temp_path = path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        self.walk(prefix).await
    }

    fn list_pages<'a>(
        &'a self,
        prefix: &str,
        options: ListingOptions,
        resume: Option<ListingResume>,
    ) -> Pin<Box<dyn Stream<Item = StorageResult<ListingPage>> + Send + 'a>> {
        // Filesystem walks cannot resume from an arbitrary position.
        if resume.is_some() {
            return Box::pin(futures::stream::once(async {
                Err(StorageError::ListingNotResumable)
            }));
        }

        let prefix = prefix.to_string();
        let page_size = options.normalized_page_size();

        let stream = async_stream::try_stream! {
            let all = self.walk(&prefix).await?;
            let mut iter = all.into_iter().peekable();
            while iter.peek().is_some() {
                let entries: Vec<ObjectEntry> = iter.by_ref().take(page_size).collect();
                yield ListingPage {
                    entries,
                    next_token: None,
                };
            }
        };

        Box::pin(stream)
    }

    async fn signed_url(
        &self,
        _key: &str,
        _ttl: Duration,
        _direction: SignedUrlDirection,
    ) -> StorageResult<String> {
        Err(StorageError::Config(
            "filesystem backend does not issue signed URLs".to_string(),
        ))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    fn listing_capabilities(&self) -> ListingCapabilities {
        ListingCapabilities { resumable: false }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;
        if !metadata.is_dir() {
            return Err(StorageError::Config(format!(
                "storage root is not a directory: {:?}",
                self.root
            )));
        }
        Ok(())
    }
}
