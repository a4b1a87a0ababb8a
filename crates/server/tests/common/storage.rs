//! Test storage backends.

use async_trait::async_trait;
use bytes::Bytes;
use depot_storage::traits::{
    ListingCapabilities, ListingOptions, ListingPage, ListingResume, ObjectEntry, ObjectMeta,
    ObjectStore, SignedUrlDirection,
};
use depot_storage::{FilesystemBackend, StorageResult};
use futures::Stream;
use std::pin::Pin;
use std::time::Duration;

/// Backend whose deletes report success but never take effect.
///
/// Simulates an eventually-consistent or misbehaving object store where
/// delete confirmation keeps finding the object present.
pub struct StubbornDeleteBackend {
    inner: FilesystemBackend,
}

impl StubbornDeleteBackend {
    pub fn new(inner: FilesystemBackend) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ObjectStore for StubbornDeleteBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.inner.put(key, data).await
    }

    async fn delete(&self, _key: &str) -> StorageResult<()> {
        // Accept the delete, change nothing.
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        self.inner.list(prefix).await
    }

    fn list_pages<'a>(
        &'a self,
        prefix: &str,
        options: ListingOptions,
        resume: Option<ListingResume>,
    ) -> Pin<Box<dyn Stream<Item = StorageResult<ListingPage>> + Send + 'a>> {
        self.inner.list_pages(prefix, options, resume)
    }

    async fn signed_url(
        &self,
        key: &str,
        ttl: Duration,
        direction: SignedUrlDirection,
    ) -> StorageResult<String> {
        self.inner.signed_url(key, ttl, direction).await
    }

    fn backend_name(&self) -> &'static str {
        "stubborn"
    }

    fn listing_capabilities(&self) -> ListingCapabilities {
        self.inner.listing_capabilities()
    }
}
