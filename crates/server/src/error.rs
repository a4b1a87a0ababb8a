//! API error types and the JSON failure envelope.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// JSON failure envelope returned for every error.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always false.
    pub success: bool,
    /// Error code for programmatic handling.
    pub error: String,
    /// Human-readable detail. Names the affected session, chunk index, or
    /// file so a client can resume; never carries connection strings or
    /// credentials.
    pub details: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("upload session {0} not found")]
    SessionNotFound(String),

    #[error("chunk {index} of session {session_id} has not been uploaded")]
    ChunkNotFound { session_id: String, index: u64 },

    #[error("chunk {index} of session {session_id} is missing from storage")]
    MissingChunk { session_id: String, index: u64 },

    #[error("upload incomplete: {uploaded} of {total} chunks received")]
    IncompleteUpload { uploaded: u64, total: u64 },

    #[error("declared size {declared} exceeds the {variant} variant maximum {max}")]
    PayloadTooLarge {
        variant: &'static str,
        declared: u64,
        max: u64,
    },

    #[error("file {0} not found")]
    FileNotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] depot_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] depot_metadata::MetadataError),

    #[error("core error: {0}")]
    Core(#[from] depot_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "session_not_found",
            Self::ChunkNotFound { .. } => "chunk_not_found",
            Self::MissingChunk { .. } => "missing_chunk",
            Self::IncompleteUpload { .. } => "incomplete_upload",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::FileNotFound(_) => "file_not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Internal(_) => "internal_error",
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Core(_) => "bad_request",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) | Self::ChunkNotFound { .. } | Self::FileNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            // The count matched but a chunk blob vanished underneath us:
            // a storage inconsistency, not a client mistake.
            Self::MissingChunk { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IncompleteUpload { .. } | Self::BadRequest(_) | Self::Core(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => {
                if e.is_not_found() {
                    StatusCode::NOT_FOUND
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
            Self::Metadata(e) => {
                if e.is_not_found() {
                    StatusCode::NOT_FOUND
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            error: self.code().to_string(),
            details: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
