//! Configuration types shared across crates.

use crate::session::UploadVariant;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Chunk size for the eager upload variant, in bytes.
    #[serde(default = "default_eager_chunk_size")]
    pub eager_chunk_size: u64,
    /// Chunk size for the lazy upload variant, in bytes.
    #[serde(default = "default_lazy_chunk_size")]
    pub lazy_chunk_size: u64,
    /// Maximum declared file size for the eager variant, in bytes.
    #[serde(default = "default_eager_max_file_size")]
    pub eager_max_file_size: u64,
    /// Maximum declared file size for the lazy variant, in bytes.
    #[serde(default = "default_lazy_max_file_size")]
    pub lazy_max_file_size: u64,
    /// Blob-delete confirmation attempts in the deletion coordinator.
    #[serde(default = "default_delete_max_attempts")]
    pub delete_max_attempts: u32,
    /// Settling delay between blob-delete confirmation attempts, in ms.
    #[serde(default = "default_delete_settle_ms")]
    pub delete_settle_ms: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

impl ServerConfig {
    /// Chunk size for the given upload variant.
    pub fn chunk_size_for(&self, variant: UploadVariant) -> u64 {
        match variant {
            UploadVariant::Eager => self.eager_chunk_size,
            UploadVariant::Lazy => self.lazy_chunk_size,
        }
    }

    /// Declared-size ceiling for the given upload variant.
    pub fn max_file_size_for(&self, variant: UploadVariant) -> u64 {
        match variant {
            UploadVariant::Eager => self.eager_max_file_size,
            UploadVariant::Lazy => self.lazy_max_file_size,
        }
    }

    /// Settling delay as a [`Duration`].
    pub fn delete_settle_delay(&self) -> Duration {
        Duration::from_millis(self.delete_settle_ms)
    }

    /// Request body ceiling for chunk upload envelopes.
    ///
    /// Chunk bytes travel as base64 inside a JSON body, so the limit must
    /// cover the 4/3 encoding expansion plus envelope overhead.
    pub fn max_chunk_body_bytes(&self) -> usize {
        let largest = self.eager_chunk_size.max(self.lazy_chunk_size) as usize;
        largest + largest / 3 + 64 * 1024
    }

    /// Create a test configuration with small chunk sizes.
    ///
    /// **For testing only.** Keeps multi-chunk uploads cheap.
    pub fn for_testing() -> Self {
        Self {
            bind: "127.0.0.1:0".to_string(),
            eager_chunk_size: 3 * 1024,
            lazy_chunk_size: 5 * 1024,
            eager_max_file_size: 100 * 1024,
            lazy_max_file_size: 500 * 1024,
            delete_max_attempts: 2,
            delete_settle_ms: 0,
            metrics_enabled: false,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_eager_chunk_size() -> u64 {
    crate::EAGER_CHUNK_SIZE
}

fn default_lazy_chunk_size() -> u64 {
    crate::LAZY_CHUNK_SIZE
}

fn default_eager_max_file_size() -> u64 {
    crate::EAGER_MAX_FILE_SIZE
}

fn default_lazy_max_file_size() -> u64 {
    crate::LAZY_MAX_FILE_SIZE
}

fn default_delete_max_attempts() -> u32 {
    2
}

fn default_delete_settle_ms() -> u64 {
    150
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            eager_chunk_size: default_eager_chunk_size(),
            lazy_chunk_size: default_lazy_chunk_size(),
            eager_max_file_size: default_eager_max_file_size(),
            lazy_max_file_size: default_lazy_max_file_size(),
            delete_max_attempts: default_delete_max_attempts(),
            delete_settle_ms: default_delete_settle_ms(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Object storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem backend.
    Filesystem {
        /// Root directory for stored objects.
        path: PathBuf,
    },
    /// S3-compatible backend.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Custom endpoint (e.g., MinIO). None uses AWS.
        #[serde(default)]
        endpoint: Option<String>,
        /// Region. Defaults to us-east-1 when unset.
        #[serde(default)]
        region: Option<String>,
        /// Key prefix applied to every object.
        #[serde(default)]
        prefix: Option<String>,
        /// Static access key. Both credential fields must be set together;
        /// when unset, the ambient AWS credential chain is used.
        #[serde(default)]
        access_key_id: Option<String>,
        /// Static secret key.
        #[serde(default)]
        secret_access_key: Option<String>,
        /// Use path-style addressing (required by MinIO).
        #[serde(default)]
        force_path_style: bool,
    },
}

impl StorageConfig {
    /// Validate the configuration, returning a message on error.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Self::Filesystem { .. } => Ok(()),
            Self::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.is_empty() {
                    return Err("s3 bucket must not be empty".to_string());
                }
                if access_key_id.is_some() != secret_access_key.is_some() {
                    return Err(
                        "access_key_id and secret_access_key must be set together".to_string()
                    );
                }
                Ok(())
            }
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database file.
    Sqlite {
        /// Path to the database file; created if missing.
        path: PathBuf,
    },
}

/// Top-level application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Object storage backend.
    pub storage: StorageConfig,
    /// Metadata store.
    pub metadata: MetadataConfig,
}
