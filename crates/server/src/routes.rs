//! Route configuration.

use crate::auth::identity_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        // Health check (intentionally unauthenticated for probes)
        .route("/v1/health", get(handlers::health_check))
        // Upload control plane
        .route("/v1/uploads/init", post(handlers::init_upload))
        .route("/v1/uploads/chunk", post(handlers::upload_chunk))
        .route("/v1/uploads/get_chunk", post(handlers::get_chunk))
        .route("/v1/uploads/session_info", post(handlers::get_session_info))
        .route("/v1/uploads/mark_completed", post(handlers::mark_completed))
        .route("/v1/uploads/combine", post(handlers::combine_upload))
        // Admin endpoints
        .route("/v1/admin/sync", post(handlers::sync))
        .route("/v1/admin/files", delete(handlers::delete_file));

    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        // Chunk envelopes carry base64 payloads well above axum's default
        // body limit.
        .layer(DefaultBodyLimit::max(
            state.config.server.max_chunk_body_bytes(),
        ))
        .layer(middleware::from_fn(identity_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
