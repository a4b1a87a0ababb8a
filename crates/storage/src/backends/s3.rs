//! S3-compatible storage backend using the AWS SDK.

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    ContinuationToken, ListingCapabilities, ListingOptions, ListingPage, ListingResume,
    ObjectEntry, ObjectMeta, ObjectStore, SignedUrlDirection,
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::time::Duration;
use tracing::instrument;

/// S3-compatible object store.
///
/// Works against AWS proper or any S3-compatible endpoint (MinIO, Ceph RGW)
/// via a custom endpoint and path-style addressing.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// When `access_key_id`/`secret_access_key` are provided they are used as
    /// static credentials; otherwise the ambient AWS credential chain applies.
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        bucket: &str,
        endpoint: Option<String>,
        region: Option<String>,
        prefix: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
    ) -> StorageResult<Self> {
        let region = aws_config::Region::new(region.unwrap_or_else(|| "us-east-1".to_string()));

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
        if let Some(endpoint) = endpoint {
            let endpoint = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                endpoint
            } else {
                format!("http://{endpoint}")
            };
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(access_key), Some(secret_key)) = (access_key_id, secret_access_key) {
            loader = loader.credentials_provider(aws_credential_types::Credentials::new(
                access_key, secret_key, None, None, "depot-static",
            ));
        }
        let shared_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared_config)
            .force_path_style(force_path_style)
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.to_string(),
            prefix: prefix.filter(|p| !p.is_empty()),
        })
    }

    /// Apply the configured key prefix.
    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
            None => key.to_string(),
        }
    }

    /// Strip the configured prefix from a listed key.
    fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        match &self.prefix {
            Some(prefix) => {
                let full = format!("{}/", prefix.trim_end_matches('/'));
                key.strip_prefix(full.as_str()).unwrap_or(key)
            }
            None => key,
        }
    }

    fn s3_error(
        operation: &'static str,
        key: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> StorageError {
        StorageError::S3 {
            operation,
            key: key.to_string(),
            source: Box::new(source),
        }
    }

    /// Fetch one listing page from ListObjectsV2.
    async fn list_page(
        &self,
        prefix: &str,
        page_size: usize,
        token: Option<String>,
    ) -> StorageResult<(Vec<ObjectEntry>, Option<String>)> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(self.full_key(prefix))
            .max_keys(page_size as i32);
        if let Some(token) = token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::s3_error("list", prefix, e))?;

        let entries = response
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                Some(ObjectEntry {
                    key: self.strip_prefix(key).to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                })
            })
            .collect();

        let next = response.next_continuation_token().map(|t| t.to_string());
        Ok((entries, next))
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    Ok(false)
                } else {
                    Err(Self::s3_error("head", key, e))
                }
            }
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await;

        match result {
            Ok(output) => Ok(ObjectMeta {
                size: output.content_length().unwrap_or(0).max(0) as u64,
                last_modified: output.last_modified().and_then(|t| {
                    time::OffsetDateTime::from_unix_timestamp(t.secs()).ok()
                }),
                content_type: output.content_type().map(|s| s.to_string()),
            }),
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    Err(StorageError::NotFound(key.to_string()))
                } else {
                    Err(Self::s3_error("head", key, e))
                }
            }
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                if e.as_service_error()
                    .is_some_and(|se| matches!(se, aws_sdk_s3::operation::get_object::GetObjectError::NoSuchKey(_)))
                {
                    return Err(StorageError::NotFound(key.to_string()));
                }
                return Err(Self::s3_error("get", key, e));
            }
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| Self::s3_error("get", key, e))?;
        Ok(data.into_bytes())
    }

    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .body(data.into())
            .send()
            .await
            .map_err(|e| Self::s3_error("put", key, e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        // S3 DeleteObject succeeds on absent keys; surface NotFound ourselves
        // so callers can distinguish "already gone".
        if !self.exists(key).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| Self::s3_error("delete", key, e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        let mut entries = Vec::new();
        let mut token = None;
        loop {
            let (mut page, next) = self
                .list_page(prefix, crate::traits::DEFAULT_PAGE_SIZE, token)
                .await?;
            entries.append(&mut page);
            match next {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        Ok(entries)
    }

    fn list_pages<'a>(
        &'a self,
        prefix: &str,
        options: ListingOptions,
        resume: Option<ListingResume>,
    ) -> Pin<Box<dyn Stream<Item = StorageResult<ListingPage>> + Send + 'a>> {
        let prefix = prefix.to_string();
        let page_size = options.normalized_page_size();

        let stream = async_stream::try_stream! {
            let mut token = match resume {
                Some(resume) => Some(
                    String::from_utf8(resume.start_token.as_bytes().to_vec()).map_err(|e| {
                        StorageError::InvalidContinuationToken(format!(
                            "continuation token is not valid UTF-8: {e}"
                        ))
                    })?,
                ),
                None => None,
            };

            loop {
                let (entries, next) = self.list_page(&prefix, page_size, token.take()).await?;
                let next_token = match &next {
                    Some(t) => Some(ContinuationToken::new(t.as_bytes().to_vec())?),
                    None => None,
                };
                let done = next.is_none();
                token = next;
                yield ListingPage { entries, next_token };
                if done {
                    break;
                }
            }
        };

        Box::pin(stream)
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn signed_url(
        &self,
        key: &str,
        ttl: Duration,
        direction: SignedUrlDirection,
    ) -> StorageResult<String> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::Config(format!("invalid presign TTL: {e}")))?;

        let uri = match direction {
            SignedUrlDirection::Download => self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(self.full_key(key))
                .presigned(presigning)
                .await
                .map_err(|e| Self::s3_error("presign_get", key, e))?
                .uri()
                .to_string(),
            SignedUrlDirection::Upload => self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(self.full_key(key))
                .presigned(presigning)
                .await
                .map_err(|e| Self::s3_error("presign_put", key, e))?
                .uri()
                .to_string(),
        };

        Ok(uri)
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    fn listing_capabilities(&self) -> ListingCapabilities {
        ListingCapabilities { resumable: true }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| Self::s3_error("head_bucket", "", e))?;
        Ok(())
    }
}
