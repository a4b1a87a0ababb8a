//! Upload control plane handlers.
//!
//! Every operation is a distinct endpoint with its own typed request body,
//! validated before any dispatch. Chunk bytes travel as base64 inside JSON
//! envelopes.

use crate::auth::require_identity;
use crate::error::{ApiError, ApiResult};
use crate::metrics::{
    BYTES_UPLOADED, CHUNK_UPLOAD_DURATION, CHUNKS_UPLOADED, UPLOAD_SESSIONS_CREATED,
};
use crate::reassembly::{self, ReassembledFile};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::{Extensions, StatusCode};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use depot_core::keys;
use depot_core::session::{SessionId, UploadSession, UploadVariant};
use depot_metadata::models::{FileRow, UploadSessionRow};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use time::OffsetDateTime;
use uuid::Uuid;

/// Request to create an upload session.
#[derive(Debug, Deserialize)]
pub struct InitRequest {
    /// Original file name.
    pub file_name: String,
    /// Declared total size in bytes.
    pub declared_size: u64,
    /// Declared MIME type.
    pub mime_type: String,
    /// Which upload variant to use.
    pub variant: UploadVariant,
}

/// Response from creating an upload session.
#[derive(Debug, Serialize)]
pub struct InitResponse {
    pub success: bool,
    pub session_id: String,
    pub total_chunks: u64,
    pub chunk_size: u64,
}

/// POST /v1/uploads/init - Create a new upload session.
#[tracing::instrument(skip(state, extensions, body), fields(file_name = %body.file_name, variant = %body.variant))]
pub async fn init_upload(
    State(state): State<AppState>,
    extensions: Extensions,
    Json(body): Json<InitRequest>,
) -> ApiResult<(StatusCode, Json<InitResponse>)> {
    require_identity(&extensions)?;

    if body.file_name.is_empty() {
        return Err(ApiError::BadRequest("file_name must not be empty".to_string()));
    }
    if body.declared_size == 0 {
        return Err(ApiError::BadRequest(
            "declared_size must be greater than zero".to_string(),
        ));
    }

    let max = state.config.server.max_file_size_for(body.variant);
    if body.declared_size > max {
        return Err(ApiError::PayloadTooLarge {
            variant: body.variant.as_str(),
            declared: body.declared_size,
            max,
        });
    }

    let chunk_size = state.config.server.chunk_size_for(body.variant);
    let session = UploadSession::new(
        &body.file_name,
        body.declared_size,
        &body.mime_type,
        body.variant,
        chunk_size,
    );

    state
        .metadata
        .create_session(&UploadSessionRow::from_session(&session))
        .await?;

    UPLOAD_SESSIONS_CREATED.inc();
    tracing::info!(
        session_id = %session.id,
        declared_size = body.declared_size,
        total_chunks = session.total_chunks,
        "Created upload session"
    );

    Ok((
        StatusCode::CREATED,
        Json(InitResponse {
            success: true,
            session_id: session.id.to_string(),
            total_chunks: session.total_chunks,
            chunk_size,
        }),
    ))
}

/// Request to upload one chunk.
#[derive(Debug, Deserialize)]
pub struct UploadChunkRequest {
    pub session_id: String,
    pub chunk_index: u64,
    /// Chunk bytes, base64-encoded.
    pub data_base64: String,
}

/// Response from uploading a chunk.
///
/// The eager variant's final chunk triggers reassembly in the same request
/// and answers with the assembled file instead of plain progress.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum UploadChunkResponse {
    Progress {
        success: bool,
        uploaded_chunks: u64,
        total_chunks: u64,
    },
    Assembled {
        success: bool,
        file_id: Uuid,
        file_key: String,
        size_bytes: u64,
        chunk_count: u64,
    },
}

/// POST /v1/uploads/chunk - Upload one chunk of a session.
#[tracing::instrument(skip(state, extensions, body), fields(session_id = %body.session_id, chunk_index = body.chunk_index))]
pub async fn upload_chunk(
    State(state): State<AppState>,
    extensions: Extensions,
    Json(body): Json<UploadChunkRequest>,
) -> ApiResult<Json<UploadChunkResponse>> {
    let start_time = Instant::now();
    let identity = require_identity(&extensions)?.clone();

    let session = lookup_session(&state, &body.session_id).await?;
    if body.chunk_index >= session.total_chunks {
        return Err(ApiError::BadRequest(format!(
            "chunk_index {} out of range for session with {} chunks",
            body.chunk_index, session.total_chunks
        )));
    }

    let data = decode_chunk(&body.data_base64)?;

    // Every chunk is exactly chunk_size except the last.
    let expected_len = if body.chunk_index == session.total_chunks - 1 {
        session.last_chunk_size()
    } else {
        session.chunk_size
    };
    if data.len() as u64 != expected_len {
        return Err(ApiError::BadRequest(format!(
            "chunk {} must be {} bytes, got {}",
            body.chunk_index,
            expected_len,
            data.len()
        )));
    }

    // Blob first, then the receipt row. A crash between the two leaves the
    // chunk uncounted; re-delivery of the same index overwrites the blob
    // and is the designed recovery path.
    let key = keys::chunk_key(session.id, body.chunk_index);
    let size = data.len() as u64;
    state.storage.put(&key, data).await?;
    state
        .metadata
        .record_chunk(
            *session.id.as_uuid(),
            body.chunk_index as i64,
            size as i64,
            OffsetDateTime::now_utc(),
        )
        .await?;

    CHUNKS_UPLOADED.inc();
    BYTES_UPLOADED.inc_by(size);

    let uploaded = state
        .metadata
        .count_received_chunks(*session.id.as_uuid())
        .await?;

    tracing::debug!(
        session_id = %session.id,
        chunk_index = body.chunk_index,
        size_bytes = size,
        uploaded,
        "Chunk uploaded"
    );

    // The eager variant reassembles as soon as the last distinct chunk is
    // in; the lazy variant always waits for an explicit combine.
    if session.variant == UploadVariant::Eager && uploaded == session.total_chunks {
        let assembled = reassembly::reassemble(
            state.storage.as_ref(),
            state.metadata.as_ref(),
            &session,
            true,
        )
        .await?;
        let record = persist_file_record(&state, Some(identity.user_id), &assembled).await?;

        CHUNK_UPLOAD_DURATION.observe(start_time.elapsed().as_secs_f64());
        return Ok(Json(UploadChunkResponse::Assembled {
            success: true,
            file_id: record.file_id,
            file_key: assembled.storage_key,
            size_bytes: assembled.total_size,
            chunk_count: assembled.chunk_count,
        }));
    }

    CHUNK_UPLOAD_DURATION.observe(start_time.elapsed().as_secs_f64());
    Ok(Json(UploadChunkResponse::Progress {
        success: true,
        uploaded_chunks: uploaded,
        total_chunks: session.total_chunks,
    }))
}

/// Request naming a session and chunk index.
#[derive(Debug, Deserialize)]
pub struct GetChunkRequest {
    pub session_id: String,
    pub chunk_index: u64,
}

/// Response carrying one chunk's bytes.
#[derive(Debug, Serialize)]
pub struct GetChunkResponse {
    pub success: bool,
    pub chunk_index: u64,
    pub data_base64: String,
}

/// POST /v1/uploads/get_chunk - Re-fetch an uploaded chunk (lazy only).
#[tracing::instrument(skip(state, extensions, body), fields(session_id = %body.session_id, chunk_index = body.chunk_index))]
pub async fn get_chunk(
    State(state): State<AppState>,
    extensions: Extensions,
    Json(body): Json<GetChunkRequest>,
) -> ApiResult<Json<GetChunkResponse>> {
    require_identity(&extensions)?;

    let session = lookup_session(&state, &body.session_id).await?;
    require_lazy(&session, "get_chunk")?;

    let received = state
        .metadata
        .has_chunk(*session.id.as_uuid(), body.chunk_index as i64)
        .await?;
    if !received {
        return Err(ApiError::ChunkNotFound {
            session_id: session.id.to_string(),
            index: body.chunk_index,
        });
    }

    let key = keys::chunk_key(session.id, body.chunk_index);
    let data = match state.storage.get(&key).await {
        Ok(data) => data,
        Err(e) if e.is_not_found() => {
            // Recorded as received but the blob is gone: storage
            // inconsistency, not a client error.
            return Err(ApiError::MissingChunk {
                session_id: session.id.to_string(),
                index: body.chunk_index,
            });
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(GetChunkResponse {
        success: true,
        chunk_index: body.chunk_index,
        data_base64: BASE64.encode(&data),
    }))
}

/// Request naming a session.
#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub session_id: String,
}

/// Session progress snapshot.
#[derive(Debug, Serialize)]
pub struct SessionInfoResponse {
    pub success: bool,
    pub session_id: String,
    pub file_name: String,
    pub declared_size: u64,
    pub mime_type: String,
    pub variant: String,
    pub chunk_size: u64,
    pub total_chunks: u64,
    pub uploaded_chunks: u64,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// POST /v1/uploads/session_info - Query session state.
#[tracing::instrument(skip(state, extensions, body), fields(session_id = %body.session_id))]
pub async fn get_session_info(
    State(state): State<AppState>,
    extensions: Extensions,
    Json(body): Json<SessionRequest>,
) -> ApiResult<Json<SessionInfoResponse>> {
    require_identity(&extensions)?;

    let session = lookup_session(&state, &body.session_id).await?;
    let uploaded = state
        .metadata
        .count_received_chunks(*session.id.as_uuid())
        .await?;

    Ok(Json(SessionInfoResponse {
        success: true,
        session_id: session.id.to_string(),
        file_name: session.file_name.clone(),
        declared_size: session.declared_size,
        mime_type: session.mime_type.clone(),
        variant: session.variant.as_str().to_string(),
        chunk_size: session.chunk_size,
        total_chunks: session.total_chunks,
        uploaded_chunks: uploaded,
        status: session.status.as_str().to_string(),
        created_at: session.created_at,
    }))
}

/// Response from marking a session completed.
#[derive(Debug, Serialize)]
pub struct MarkCompletedResponse {
    pub success: bool,
    pub status: String,
}

/// POST /v1/uploads/mark_completed - Advisory completion marker (lazy only).
///
/// Does not validate that all chunks are present; `status = completed` is
/// bookkeeping and is never consulted by combine.
#[tracing::instrument(skip(state, extensions, body), fields(session_id = %body.session_id))]
pub async fn mark_completed(
    State(state): State<AppState>,
    extensions: Extensions,
    Json(body): Json<SessionRequest>,
) -> ApiResult<Json<MarkCompletedResponse>> {
    require_identity(&extensions)?;

    let session = lookup_session(&state, &body.session_id).await?;
    require_lazy(&session, "mark_completed")?;

    state
        .metadata
        .mark_completed(*session.id.as_uuid(), OffsetDateTime::now_utc())
        .await?;

    Ok(Json(MarkCompletedResponse {
        success: true,
        status: "completed".to_string(),
    }))
}

/// Response from combining a session into a file.
#[derive(Debug, Serialize)]
pub struct CombineResponse {
    pub success: bool,
    pub file_id: Uuid,
    pub file_key: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub chunk_count: u64,
}

/// POST /v1/uploads/combine - Reassemble a session's chunks (lazy only).
#[tracing::instrument(skip(state, extensions, body), fields(session_id = %body.session_id))]
pub async fn combine_upload(
    State(state): State<AppState>,
    extensions: Extensions,
    Json(body): Json<SessionRequest>,
) -> ApiResult<Json<CombineResponse>> {
    let identity = require_identity(&extensions)?.clone();

    let session = lookup_session(&state, &body.session_id).await?;
    require_lazy(&session, "combine")?;

    // The lazy path trusts chunk accounting alone; the assembled length is
    // not re-checked against the declared size.
    let assembled = reassembly::reassemble(
        state.storage.as_ref(),
        state.metadata.as_ref(),
        &session,
        false,
    )
    .await?;
    let record = persist_file_record(&state, Some(identity.user_id), &assembled).await?;

    Ok(Json(CombineResponse {
        success: true,
        file_id: record.file_id,
        file_key: assembled.storage_key,
        file_name: assembled.file_name,
        size_bytes: assembled.total_size,
        chunk_count: assembled.chunk_count,
    }))
}

/// Look up a session by its string ID.
async fn lookup_session(state: &AppState, session_id: &str) -> ApiResult<UploadSession> {
    let id = SessionId::parse(session_id)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let row = state
        .metadata
        .get_session(*id.as_uuid())
        .await?
        .ok_or_else(|| ApiError::SessionNotFound(session_id.to_string()))?;
    Ok(row.to_session()?)
}

/// Reject operations that only the lazy variant supports.
fn require_lazy(session: &UploadSession, operation: &str) -> ApiResult<()> {
    if session.variant != UploadVariant::Lazy {
        return Err(ApiError::BadRequest(format!(
            "{operation} is only available for lazy uploads"
        )));
    }
    Ok(())
}

fn decode_chunk(data_base64: &str) -> ApiResult<Bytes> {
    let data = BASE64
        .decode(data_base64)
        .map_err(|e| ApiError::BadRequest(format!("invalid base64 chunk data: {e}")))?;
    Ok(Bytes::from(data))
}

/// Insert the logical-file metadata record for an assembled blob.
pub(crate) async fn persist_file_record(
    state: &AppState,
    uploader_id: Option<Uuid>,
    assembled: &ReassembledFile,
) -> ApiResult<FileRow> {
    let record = FileRow {
        file_id: Uuid::new_v4(),
        file_name: assembled.file_name.clone(),
        size_bytes: assembled.total_size as i64,
        mime_type: assembled.mime_type.clone(),
        storage_key: assembled.storage_key.clone(),
        checksum: Some(assembled.checksum.clone()),
        uploader_id,
        created_at: OffsetDateTime::now_utc(),
    };
    state.metadata.insert_file(&record).await?;
    Ok(record)
}
