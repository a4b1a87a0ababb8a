//! Prometheus metrics for the depot server.
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping
//! and is gated by `server.metrics_enabled`. Restrict it to scraper IPs at
//! the infrastructure level; metrics carry aggregate usage only.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static UPLOAD_SESSIONS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_upload_sessions_created_total",
        "Total number of upload sessions created",
    )
    .expect("metric creation failed")
});

pub static CHUNKS_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_chunks_uploaded_total",
        "Total number of chunks persisted",
    )
    .expect("metric creation failed")
});

pub static BYTES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_bytes_uploaded_total",
        "Total chunk bytes persisted",
    )
    .expect("metric creation failed")
});

pub static FILES_ASSEMBLED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_files_assembled_total",
        "Total number of files reassembled from chunks",
    )
    .expect("metric creation failed")
});

pub static FILES_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_files_deleted_total",
        "Total number of logical files deleted",
    )
    .expect("metric creation failed")
});

pub static RECONCILE_RUNS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_reconcile_runs_total",
        "Total number of reconciliation passes",
    )
    .expect("metric creation failed")
});

pub static RECONCILE_ORPHANS_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_reconcile_orphans_deleted_total",
        "Total orphaned blobs deleted by reconciliation",
    )
    .expect("metric creation failed")
});

pub static CHUNK_UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "depot_chunk_upload_duration_seconds",
            "Chunk upload handler latency",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
    )
    .expect("metric creation failed")
});

static REGISTER: Once = Once::new();

/// Register all metrics into the global registry. Idempotent.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let registry = &*REGISTRY;
        registry
            .register(Box::new(UPLOAD_SESSIONS_CREATED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(CHUNKS_UPLOADED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(BYTES_UPLOADED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(FILES_ASSEMBLED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(FILES_DELETED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(RECONCILE_RUNS.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(RECONCILE_ORPHANS_DELETED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(CHUNK_UPLOAD_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    register_metrics();

    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }

    match String::from_utf8(buffer) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            tracing::error!(error = %e, "Metrics buffer was not valid UTF-8");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}
