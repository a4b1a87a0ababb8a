//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::time::Duration;

/// Page size constraints for listing operations.
pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const MIN_PAGE_SIZE: usize = 100;
pub const MAX_PAGE_SIZE: usize = 10000;

/// Maximum size for continuation tokens (2 KB).
pub const MAX_TOKEN_SIZE: usize = 2048;

/// An opaque continuation token for resuming listing operations.
///
/// Backend-specific; callers must not parse or modify it. Size-capped to
/// keep tokens cheap to store and transmit.
#[derive(Clone, PartialEq, Eq)]
pub struct ContinuationToken(Vec<u8>);

impl ContinuationToken {
    /// Create a new continuation token from raw bytes.
    ///
    /// Returns an error if the token exceeds [`MAX_TOKEN_SIZE`].
    pub fn new(data: Vec<u8>) -> StorageResult<Self> {
        if data.len() > MAX_TOKEN_SIZE {
            return Err(crate::error::StorageError::InvalidContinuationToken(
                format!(
                    "continuation token too large: {} bytes (max: {})",
                    data.len(),
                    MAX_TOKEN_SIZE
                ),
            ));
        }
        Ok(Self(data))
    }

    /// Get the raw token bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Convert to base64 for serialization.
    pub fn to_base64(&self) -> String {
        use base64::{Engine as _, engine::general_purpose};
        general_purpose::STANDARD.encode(&self.0)
    }

    /// Parse from base64.
    pub fn from_base64(s: &str) -> StorageResult<Self> {
        // Bound the input before decoding; base64 expands by ~4/3 so 2x the
        // raw cap is a safe ceiling.
        const MAX_BASE64_INPUT: usize = MAX_TOKEN_SIZE * 2;
        if s.len() > MAX_BASE64_INPUT {
            return Err(crate::error::StorageError::InvalidContinuationToken(
                format!(
                    "continuation token base64 too large: {} bytes (max: {})",
                    s.len(),
                    MAX_BASE64_INPUT
                ),
            ));
        }

        use base64::{Engine as _, engine::general_purpose};
        let data = general_purpose::STANDARD.decode(s).map_err(|e| {
            crate::error::StorageError::InvalidContinuationToken(format!(
                "invalid continuation token base64: {e}"
            ))
        })?;
        Self::new(data)
    }
}

impl std::fmt::Debug for ContinuationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ContinuationToken")
            .field(&"<redacted>")
            .finish()
    }
}

/// One object in a listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
}

/// A single page of listing results.
#[derive(Clone, Debug)]
pub struct ListingPage {
    /// Objects in this page.
    pub entries: Vec<ObjectEntry>,
    /// Continuation token for the next page, if there are more results.
    pub next_token: Option<ContinuationToken>,
}

/// Backend capabilities for listing operations.
#[derive(Clone, Debug)]
pub struct ListingCapabilities {
    /// Whether the backend can resume a listing from a continuation token.
    pub resumable: bool,
}

/// Options for listing operations.
#[derive(Clone, Debug)]
pub struct ListingOptions {
    /// Number of entries to fetch per page; clamped to
    /// [`MIN_PAGE_SIZE`, `MAX_PAGE_SIZE`].
    pub page_size: usize,
}

impl ListingOptions {
    /// Create new listing options with the given page size.
    pub fn new(page_size: usize) -> Self {
        Self { page_size }
    }

    /// Get the page size clamped to the valid range.
    pub fn normalized_page_size(&self) -> usize {
        self.page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    }
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Resume options for listing operations.
#[derive(Clone, Debug)]
pub struct ListingResume {
    /// Continuation token from a previous listing page.
    pub start_token: ContinuationToken,
}

impl ListingResume {
    /// Create new resume options with the given token.
    pub fn new(start_token: ContinuationToken) -> Self {
        Self { start_token }
    }
}

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<time::OffsetDateTime>,
    /// Content type (if available).
    pub content_type: Option<String>,
}

/// Direction of a presigned URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignedUrlDirection {
    /// URL grants a GET.
    Download,
    /// URL grants a PUT.
    Upload,
}

/// Object store abstraction.
///
/// Writes are atomic per key and overwrite-by-key: re-writing a key replaces
/// its content, which is the designed recovery path for chunk re-delivery.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's metadata without fetching content.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put an object atomically, overwriting any existing content.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete an object. Deleting an absent key is `NotFound`.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List all objects with a prefix, materialized in memory.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>>;

    /// List objects with a prefix, returning a stream of pages.
    ///
    /// Each page carries up to `page_size` entries and an optional
    /// continuation token. Backends that cannot resume reject a `resume`
    /// argument with [`crate::StorageError::ListingNotResumable`].
    fn list_pages<'a>(
        &'a self,
        prefix: &str,
        options: ListingOptions,
        resume: Option<ListingResume>,
    ) -> Pin<Box<dyn Stream<Item = StorageResult<ListingPage>> + Send + 'a>>;

    /// Issue a presigned URL for direct client access.
    async fn signed_url(
        &self,
        key: &str,
        ttl: Duration,
        direction: SignedUrlDirection,
    ) -> StorageResult<String>;

    /// Static identifier for the backend type ("s3", "filesystem").
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Get the listing capabilities of this backend.
    fn listing_capabilities(&self) -> ListingCapabilities;

    /// Verify storage backend connectivity.
    ///
    /// Called during server startup and from the health endpoint. The
    /// default implementation returns Ok(()).
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("backend", &self.backend_name())
            .finish()
    }
}
