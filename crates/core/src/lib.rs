//! Core domain types for the depot file-distribution portal.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Upload session identifiers and lifecycle
//! - Upload variants (eager / lazy) and their chunking parameters
//! - Storage key derivation and namespace conventions
//! - Configuration types

pub mod config;
pub mod error;
pub mod keys;
pub mod session;

pub use config::{AppConfig, MetadataConfig, ServerConfig, StorageConfig};
pub use error::{Error, Result};
pub use session::{SessionId, SessionStatus, UploadSession, UploadVariant};

/// Default chunk size for the eager upload variant: 3 MiB.
pub const EAGER_CHUNK_SIZE: u64 = 3 * 1024 * 1024;

/// Default chunk size for the lazy upload variant: 5 MiB.
pub const LAZY_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum declared file size for the eager variant: 100 MiB.
pub const EAGER_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum declared file size for the lazy variant: 500 MiB.
pub const LAZY_MAX_FILE_SIZE: u64 = 500 * 1024 * 1024;
