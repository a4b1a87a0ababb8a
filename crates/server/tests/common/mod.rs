//! Common test utilities and fixtures.

pub mod storage;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use depot_core::config::{AppConfig, MetadataConfig, ServerConfig, StorageConfig};
use depot_metadata::{MetadataStore, SqliteStore};
use depot_server::{AppState, create_router};
use depot_storage::{FilesystemBackend, ObjectStore};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage and small chunk sizes.
    pub async fn new() -> Self {
        Self::build(None).await
    }

    /// Create a test server whose storage silently ignores deletes.
    pub async fn with_stubborn_deletes() -> Self {
        Self::build(Some(Box::new(|inner| {
            Arc::new(storage::StubbornDeleteBackend::new(inner))
        })))
        .await
    }

    async fn build(
        wrap: Option<Box<dyn FnOnce(FilesystemBackend) -> Arc<dyn ObjectStore>>>,
    ) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("objects");
        let inner = FilesystemBackend::new(&storage_path)
            .await
            .expect("Failed to create storage backend");
        let storage: Arc<dyn ObjectStore> = match wrap {
            Some(wrap) => wrap(inner),
            None => Arc::new(inner),
        };

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );

        let config = AppConfig {
            server: ServerConfig::for_testing(),
            storage: StorageConfig::Filesystem {
                path: storage_path,
            },
            metadata: MetadataConfig::Sqlite { path: db_path },
        };

        let state = AppState::new(config, storage, metadata);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata store.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Get access to the underlying object store.
    pub fn storage(&self) -> Arc<dyn ObjectStore> {
        self.state.storage.clone()
    }

    /// Eager-variant chunk size from the test configuration.
    pub fn eager_chunk_size(&self) -> usize {
        self.state.config.server.eager_chunk_size as usize
    }

    /// Lazy-variant chunk size from the test configuration.
    pub fn lazy_chunk_size(&self) -> usize {
        self.state.config.server.lazy_chunk_size as usize
    }
}

/// The caller identity attached to a test request.
#[allow(dead_code)]
#[derive(Clone, Copy)]
pub enum Caller {
    None,
    User(Uuid),
    Admin(Uuid),
}

#[allow(dead_code)]
impl Caller {
    pub fn user() -> Self {
        Self::User(Uuid::new_v4())
    }

    pub fn admin() -> Self {
        Self::Admin(Uuid::new_v4())
    }
}

/// Make a JSON request against the router and decode the JSON response.
#[allow(dead_code)]
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    caller: Caller,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    match caller {
        Caller::None => {}
        Caller::User(id) => {
            builder = builder.header("x-depot-user-id", id.to_string());
        }
        Caller::Admin(id) => {
            builder = builder
                .header("x-depot-user-id", id.to_string())
                .header("x-depot-admin", "true");
        }
    }

    let request_body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let request = builder.body(request_body).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

/// Deterministic test payload of the given length.
#[allow(dead_code)]
pub fn test_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Split a payload into base64-encoded chunks of the given size.
#[allow(dead_code)]
pub fn chunk_payload(payload: &[u8], chunk_size: usize) -> Vec<String> {
    use base64::Engine as _;
    payload
        .chunks(chunk_size)
        .map(|c| base64::engine::general_purpose::STANDARD.encode(c))
        .collect()
}
