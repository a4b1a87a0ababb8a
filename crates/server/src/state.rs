//! Application state shared across handlers.

use crate::retry::RetryPolicy;
use depot_core::config::AppConfig;
use depot_metadata::MetadataStore;
use depot_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend.
    pub storage: Arc<dyn ObjectStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            metadata,
        }
    }

    /// Retry policy for blob-delete confirmation, from configuration.
    pub fn delete_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.config.server.delete_max_attempts,
            self.config.server.delete_settle_delay(),
        )
    }
}
