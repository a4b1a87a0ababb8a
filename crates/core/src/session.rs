//! Upload session types and lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for an upload session.
///
/// The session ID doubles as the namespace for all of the session's chunk
/// keys in the blob store (see [`crate::keys`]), so it must never collide
/// with another session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidSessionId(format!("{s}: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload variant selecting the chunking protocol.
///
/// The two variants differ in chunk size, declared-size ceiling, and
/// completion semantics: the eager variant reassembles automatically when
/// the final chunk arrives, while the lazy variant supports out-of-order
/// upload, per-index chunk retrieval, and an explicit combine step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadVariant {
    /// Smaller chunks, implicit reassembly on the last chunk.
    Eager,
    /// Larger chunks, explicit combine; chunks may be re-fetched by index.
    Lazy,
}

impl UploadVariant {
    /// Stable string form used in the database and wire protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eager => "eager",
            Self::Lazy => "lazy",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "eager" => Ok(Self::Eager),
            "lazy" => Ok(Self::Lazy),
            other => Err(crate::Error::InvalidVariant(other.to_string())),
        }
    }
}

impl fmt::Display for UploadVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upload session state.
///
/// `Completed` is advisory bookkeeping set by the client: it does NOT imply
/// all chunks are present, and reassembly never consults it. Completeness is
/// always derived from the distinct set of received chunk indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Session is accepting chunks.
    Uploading,
    /// Client marked the session complete.
    Completed,
}

impl SessionStatus {
    /// Stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Completed => "completed",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "uploading" => Ok(Self::Uploading),
            "completed" => Ok(Self::Completed),
            other => Err(crate::Error::InvalidStatus(other.to_string())),
        }
    }
}

/// An in-progress chunked upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadSession {
    /// Unique session identifier.
    pub id: SessionId,
    /// Original file name supplied at init.
    pub file_name: String,
    /// Declared total size in bytes, supplied at init.
    pub declared_size: u64,
    /// Declared MIME type, supplied at init.
    pub mime_type: String,
    /// Which upload variant this session uses.
    pub variant: UploadVariant,
    /// Chunk size fixed at session creation.
    pub chunk_size: u64,
    /// Expected number of chunks.
    pub total_chunks: u64,
    /// Current session status.
    pub status: SessionStatus,
    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the client marked the session completed, if it did.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl UploadSession {
    /// Create a new session with a fresh ID.
    pub fn new(
        file_name: impl Into<String>,
        declared_size: u64,
        mime_type: impl Into<String>,
        variant: UploadVariant,
        chunk_size: u64,
    ) -> Self {
        Self {
            id: SessionId::new(),
            file_name: file_name.into(),
            declared_size,
            mime_type: mime_type.into(),
            variant,
            chunk_size,
            total_chunks: expected_chunk_count(declared_size, chunk_size),
            status: SessionStatus::Uploading,
            created_at: OffsetDateTime::now_utc(),
            completed_at: None,
        }
    }

    /// Byte length every chunk except the last must have.
    pub fn full_chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Byte length of the final chunk.
    pub fn last_chunk_size(&self) -> u64 {
        if self.total_chunks == 0 {
            return 0;
        }
        self.declared_size - self.chunk_size * (self.total_chunks - 1)
    }
}

/// Calculate the expected number of chunks for a declared size.
pub fn expected_chunk_count(declared_size: u64, chunk_size: u64) -> u64 {
    declared_size.div_ceil(chunk_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_roundtrip() {
        let id = SessionId::new();
        let parsed = SessionId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(SessionId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_variant_roundtrip() {
        for variant in [UploadVariant::Eager, UploadVariant::Lazy] {
            assert_eq!(UploadVariant::parse(variant.as_str()).unwrap(), variant);
        }
        assert!(UploadVariant::parse("greedy").is_err());
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [SessionStatus::Uploading, SessionStatus::Completed] {
            assert_eq!(SessionStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(SessionStatus::parse("done").is_err());
    }

    #[test]
    fn test_expected_chunk_count() {
        assert_eq!(expected_chunk_count(100, 64), 2);
        assert_eq!(expected_chunk_count(128, 64), 2);
        assert_eq!(expected_chunk_count(129, 64), 3);
        assert_eq!(expected_chunk_count(0, 64), 0);
    }

    #[test]
    fn test_last_chunk_size() {
        let session = UploadSession::new("a.bin", 100, "application/octet-stream", UploadVariant::Eager, 30);
        assert_eq!(session.total_chunks, 4);
        assert_eq!(session.last_chunk_size(), 10);

        let exact = UploadSession::new("b.bin", 90, "application/octet-stream", UploadVariant::Lazy, 30);
        assert_eq!(exact.total_chunks, 3);
        assert_eq!(exact.last_chunk_size(), 30);
    }

    #[test]
    fn test_session_serde_shape() {
        let session = UploadSession::new("a.bin", 10, "text/plain", UploadVariant::Lazy, 4);
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["variant"], "lazy");
        assert_eq!(value["status"], "uploading");
        assert_eq!(value["total_chunks"], 3);
    }
}
