//! Storage key derivation and namespace conventions.
//!
//! Chunk keys and final-file keys share one blob store but live under
//! structurally disjoint prefixes. The reconciler only ever lists the
//! `files/` namespace, so in-flight session chunks can never be
//! misclassified as orphaned files.

use crate::session::SessionId;
use time::OffsetDateTime;

/// Prefix for per-session chunk blobs.
pub const CHUNK_PREFIX: &str = "chunks/";

/// Prefix for reassembled, durable file blobs.
pub const FILE_PREFIX: &str = "files/";

/// Maximum length of the sanitized file-name component of a file key.
const MAX_NAME_LEN: usize = 120;

/// Derive the blob key for one chunk of a session.
pub fn chunk_key(session_id: SessionId, index: u64) -> String {
    format!("{CHUNK_PREFIX}{session_id}/{index}")
}

/// Prefix under which all of a session's chunks live.
pub fn session_chunk_prefix(session_id: SessionId) -> String {
    format!("{CHUNK_PREFIX}{session_id}/")
}

/// Derive a fresh blob key for a reassembled file.
///
/// The key embeds the upload timestamp so repeated uploads of the same file
/// name produce distinct keys.
pub fn file_key(uploaded_at: OffsetDateTime, file_name: &str) -> String {
    format!(
        "{FILE_PREFIX}{}-{}",
        uploaded_at.unix_timestamp(),
        sanitize_file_name(file_name)
    )
}

/// Reduce an arbitrary client-supplied file name to a safe key component.
///
/// Keeps ASCII alphanumerics, `.`, `_`, and `-`; everything else becomes
/// `_`. Leading dots are stripped so the component can never be `.` / `..`
/// or a hidden file, and the result is length-capped.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len().min(MAX_NAME_LEN));
    for c in name.chars() {
        if out.len() >= MAX_NAME_LEN {
            break;
        }
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    let trimmed = out.trim_start_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}
