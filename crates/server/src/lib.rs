//! HTTP control plane for the depot file-distribution portal.
//!
//! This crate provides:
//! - Chunked upload session management (eager and lazy variants)
//! - Chunk reassembly into durable file blobs
//! - Consistency reconciliation between metadata and blob storage
//! - Coordinated file deletion across both stores

pub mod auth;
pub mod deletion;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod reassembly;
pub mod reconcile;
pub mod retry;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use retry::RetryPolicy;
pub use routes::create_router;
pub use state::AppState;
