//! Integration tests for the chunked upload protocol.

mod common;

use axum::http::StatusCode;
use common::{Caller, TestServer, chunk_payload, json_request, test_payload};
use serde_json::json;

async fn init_session(
    server: &TestServer,
    caller: Caller,
    variant: &str,
    declared_size: usize,
) -> (String, u64) {
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/uploads/init",
        Some(json!({
            "file_name": "archive.bin",
            "declared_size": declared_size,
            "mime_type": "application/octet-stream",
            "variant": variant,
        })),
        caller,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "init failed: {body}");
    assert_eq!(body["success"], true);
    (
        body["session_id"].as_str().unwrap().to_string(),
        body["total_chunks"].as_u64().unwrap(),
    )
}

async fn upload_chunk(
    server: &TestServer,
    caller: Caller,
    session_id: &str,
    index: usize,
    data_base64: &str,
) -> (StatusCode, serde_json::Value) {
    json_request(
        &server.router,
        "POST",
        "/v1/uploads/chunk",
        Some(json!({
            "session_id": session_id,
            "chunk_index": index,
            "data_base64": data_base64,
        })),
        caller,
    )
    .await
}

#[tokio::test]
async fn init_requires_identity() {
    let server = TestServer::new().await;
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/uploads/init",
        Some(json!({
            "file_name": "a",
            "declared_size": 10,
            "mime_type": "text/plain",
            "variant": "eager",
        })),
        Caller::None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn init_rejects_oversized_declared_size() {
    let server = TestServer::new().await;
    let max = server.state.config.server.eager_max_file_size;

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/uploads/init",
        Some(json!({
            "file_name": "big.bin",
            "declared_size": max + 1,
            "mime_type": "application/octet-stream",
            "variant": "eager",
        })),
        Caller::user(),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "payload_too_large");

    // The lazy variant has a higher ceiling; the same size is accepted.
    let (status, _) = json_request(
        &server.router,
        "POST",
        "/v1/uploads/init",
        Some(json!({
            "file_name": "big.bin",
            "declared_size": max + 1,
            "mime_type": "application/octet-stream",
            "variant": "lazy",
        })),
        Caller::user(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn init_rejects_zero_size() {
    let server = TestServer::new().await;
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/uploads/init",
        Some(json!({
            "file_name": "empty",
            "declared_size": 0,
            "mime_type": "text/plain",
            "variant": "lazy",
        })),
        Caller::user(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn eager_round_trip_with_short_final_chunk() {
    let server = TestServer::new().await;
    let caller = Caller::user();

    // A 7-unit file with 3-unit chunks: sizes [3, 3, 1].
    let chunk_size = server.eager_chunk_size();
    let payload = test_payload(chunk_size * 7 / 3);
    let chunks = chunk_payload(&payload, chunk_size);
    assert_eq!(chunks.len(), 3);

    let (session_id, total) = init_session(&server, caller, "eager", payload.len()).await;
    assert_eq!(total, 3);

    // First two chunks report plain progress.
    for (i, chunk) in chunks.iter().take(2).enumerate() {
        let (status, body) = upload_chunk(&server, caller, &session_id, i, chunk).await;
        assert_eq!(status, StatusCode::OK, "chunk {i} failed: {body}");
        assert_eq!(body["uploaded_chunks"], (i + 1) as u64);
        assert_eq!(body["total_chunks"], 3);
        assert!(body.get("file_key").is_none());
    }

    // The final chunk triggers reassembly in the same request.
    let (status, body) = upload_chunk(&server, caller, &session_id, 2, &chunks[2]).await;
    assert_eq!(status, StatusCode::OK, "final chunk failed: {body}");
    let file_key = body["file_key"].as_str().unwrap().to_string();
    assert!(file_key.starts_with("files/"));
    assert_eq!(body["size_bytes"].as_u64().unwrap(), payload.len() as u64);
    assert_eq!(body["chunk_count"], 3);

    // The assembled blob is byte-identical to the original.
    let assembled = server.storage().get(&file_key).await.unwrap();
    assert_eq!(assembled.as_ref(), payload.as_slice());

    // Session and chunk storage are released.
    let (status, _) = json_request(
        &server.router,
        "POST",
        "/v1/uploads/session_info",
        Some(json!({"session_id": session_id})),
        caller,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(server.storage().list("chunks/").await.unwrap().is_empty());

    // A metadata record now points at the blob.
    let files = server.metadata().list_files().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].storage_key, file_key);
    assert_eq!(files[0].size_bytes, payload.len() as i64);
    assert!(files[0].checksum.is_some());
}

#[tokio::test]
async fn chunk_upload_is_idempotent() {
    let server = TestServer::new().await;
    let caller = Caller::user();

    let chunk_size = server.lazy_chunk_size();
    let payload = test_payload(chunk_size * 2 + 10);
    let chunks = chunk_payload(&payload, chunk_size);

    let (session_id, total) = init_session(&server, caller, "lazy", payload.len()).await;
    assert_eq!(total, 3);

    let (status, body) = upload_chunk(&server, caller, &session_id, 0, &chunks[0]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uploaded_chunks"], 1);

    // Re-uploading the same index must not inflate the count.
    let (status, body) = upload_chunk(&server, caller, &session_id, 0, &chunks[0]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uploaded_chunks"], 1);

    let (_, info) = json_request(
        &server.router,
        "POST",
        "/v1/uploads/session_info",
        Some(json!({"session_id": session_id})),
        caller,
    )
    .await;
    assert_eq!(info["uploaded_chunks"], 1);
    assert_eq!(info["status"], "uploading");
}

#[tokio::test]
async fn reverse_order_upload_reassembles_identically() {
    let server = TestServer::new().await;
    let caller = Caller::user();

    let chunk_size = server.lazy_chunk_size();
    let payload = test_payload(chunk_size * 3 - 37);
    let chunks = chunk_payload(&payload, chunk_size);
    assert_eq!(chunks.len(), 3);

    // Upload in reverse order.
    let (session_id, _) = init_session(&server, caller, "lazy", payload.len()).await;
    for i in (0..chunks.len()).rev() {
        let (status, _) = upload_chunk(&server, caller, &session_id, i, &chunks[i]).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/uploads/combine",
        Some(json!({"session_id": session_id})),
        caller,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "combine failed: {body}");
    assert_eq!(body["size_bytes"].as_u64().unwrap(), payload.len() as u64);

    let file_key = body["file_key"].as_str().unwrap();
    let assembled = server.storage().get(file_key).await.unwrap();
    assert_eq!(assembled.as_ref(), payload.as_slice());
}

#[tokio::test]
async fn combine_before_complete_fails_and_preserves_state() {
    let server = TestServer::new().await;
    let caller = Caller::user();

    let chunk_size = server.lazy_chunk_size();
    let payload = test_payload(chunk_size * 2 + 100);
    let chunks = chunk_payload(&payload, chunk_size);
    assert_eq!(chunks.len(), 3);

    let (session_id, _) = init_session(&server, caller, "lazy", payload.len()).await;
    for i in 0..2 {
        upload_chunk(&server, caller, &session_id, i, &chunks[i]).await;
    }

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/uploads/combine",
        Some(json!({"session_id": session_id})),
        caller,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "incomplete_upload");
    assert!(body["details"].as_str().unwrap().contains("2 of 3"));

    // Nothing was deleted: session still answers, both chunks still stored.
    let (status, info) = json_request(
        &server.router,
        "POST",
        "/v1/uploads/session_info",
        Some(json!({"session_id": session_id})),
        caller,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["uploaded_chunks"], 2);
    assert_eq!(server.storage().list("chunks/").await.unwrap().len(), 2);
    assert!(server.storage().list("files/").await.unwrap().is_empty());
}

#[tokio::test]
async fn get_chunk_round_trips_and_distinguishes_missing() {
    let server = TestServer::new().await;
    let caller = Caller::user();

    let chunk_size = server.lazy_chunk_size();
    let payload = test_payload(chunk_size + 5);
    let chunks = chunk_payload(&payload, chunk_size);

    let (session_id, _) = init_session(&server, caller, "lazy", payload.len()).await;
    upload_chunk(&server, caller, &session_id, 0, &chunks[0]).await;

    // Uploaded chunk round-trips.
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/uploads/get_chunk",
        Some(json!({"session_id": session_id, "chunk_index": 0})),
        caller,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data_base64"].as_str().unwrap(), chunks[0]);

    // Not-yet-uploaded index is chunk_not_found.
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/uploads/get_chunk",
        Some(json!({"session_id": session_id, "chunk_index": 1})),
        caller,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "chunk_not_found");

    // Unknown session is session_not_found.
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/uploads/get_chunk",
        Some(json!({"session_id": uuid::Uuid::new_v4().to_string(), "chunk_index": 0})),
        caller,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "session_not_found");
}

#[tokio::test]
async fn mark_completed_is_advisory() {
    let server = TestServer::new().await;
    let caller = Caller::user();

    let chunk_size = server.lazy_chunk_size();
    let payload = test_payload(chunk_size * 2);
    let (session_id, _) = init_session(&server, caller, "lazy", payload.len()).await;

    // Completes without any chunks present.
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/uploads/mark_completed",
        Some(json!({"session_id": session_id})),
        caller,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let (_, info) = json_request(
        &server.router,
        "POST",
        "/v1/uploads/session_info",
        Some(json!({"session_id": session_id})),
        caller,
    )
    .await;
    assert_eq!(info["status"], "completed");
    assert_eq!(info["uploaded_chunks"], 0);

    // Combine still enforces real completeness regardless of status.
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/uploads/combine",
        Some(json!({"session_id": session_id})),
        caller,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "incomplete_upload");
}

#[tokio::test]
async fn lazy_only_operations_rejected_for_eager_sessions() {
    let server = TestServer::new().await;
    let caller = Caller::user();

    let (session_id, _) = init_session(&server, caller, "eager", 100).await;

    for uri in [
        "/v1/uploads/get_chunk",
        "/v1/uploads/mark_completed",
        "/v1/uploads/combine",
    ] {
        let (status, body) = json_request(
            &server.router,
            "POST",
            uri,
            Some(json!({"session_id": session_id, "chunk_index": 0})),
            caller,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} should be rejected");
        assert_eq!(body["error"], "bad_request");
    }
}

#[tokio::test]
async fn chunk_validation_rejects_bad_input() {
    let server = TestServer::new().await;
    let caller = Caller::user();

    let chunk_size = server.lazy_chunk_size();
    let payload = test_payload(chunk_size + 1);
    let chunks = chunk_payload(&payload, chunk_size);
    let (session_id, _) = init_session(&server, caller, "lazy", payload.len()).await;

    // Out-of-range index.
    let (status, _) = upload_chunk(&server, caller, &session_id, 5, &chunks[0]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Wrong length for a non-final chunk.
    let (status, body) = upload_chunk(&server, caller, &session_id, 0, &chunks[1]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"].as_str().unwrap().contains("bytes"));

    // Invalid base64.
    let (status, _) = upload_chunk(&server, caller, &session_id, 0, "not-base64!!!").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown session names the session in the error.
    let missing = uuid::Uuid::new_v4().to_string();
    let (status, body) = upload_chunk(&server, caller, &missing, 0, &chunks[0]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["details"].as_str().unwrap().contains(&missing));
}
