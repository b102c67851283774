//! Upload types for chunked, session-batched uploads

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on the declared chunk count of a single file
pub const MAX_CHUNKS_PER_FILE: usize = 10_000;

// ============================================================================
// Session Types
// ============================================================================

/// A client-defined batch of files published together as one commit
#[derive(Debug, Clone)]
pub struct UploadSession {
    /// Client-supplied session ID
    pub id: String,

    /// Files in this session, keyed by client-supplied file ID
    pub files: BTreeMap<String, FileUpload>,

    /// Session creation time
    pub created_at: DateTime<Utc>,

    /// Time of the last accepted chunk
    pub last_activity: DateTime<Utc>,

    /// Current status
    pub status: SessionStatus,
}

impl UploadSession {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            files: BTreeMap::new(),
            created_at: now,
            last_activity: now,
            status: SessionStatus::Open,
        }
    }

    /// Check whether the session has been idle longer than `ttl`
    pub fn is_idle_for(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.last_activity > ttl
    }
}

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Accepting chunks
    Open,
    /// Published; kept only until removed from the store
    Committed,
    /// Evicted by the idle sweep
    Expired,
}

/// One file being reassembled from chunks
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// Destination file name
    pub name: String,

    /// Declared chunk count, fixed by the first chunk
    pub total: usize,

    /// One slot per chunk index; `None` until received
    pub chunks: Vec<Option<Bytes>>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, total: usize) -> Self {
        Self {
            name: name.into(),
            total,
            chunks: vec![None; total],
        }
    }

    /// Number of slots filled so far
    pub fn received(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(Option::is_some)
    }

    /// Indices of chunks that have not arrived yet
    pub fn missing_chunks(&self) -> Vec<usize> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_none())
            .map(|(i, _)| i)
            .collect()
    }
}

// ============================================================================
// Chunk Types
// ============================================================================

/// A single chunk as received from the client
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub session_id: String,
    pub file_id: String,
    pub file_name: String,
    pub index: usize,
    pub total: usize,
    pub data: Bytes,
}

/// Acknowledgement returned after storing a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkAck {
    pub ok: bool,

    /// Chunk index that was stored
    pub index: usize,

    /// Slots filled for this file so far
    pub received: usize,

    /// Declared chunk count
    pub total: usize,
}

// ============================================================================
// Progress Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub session_id: String,
    pub files: Vec<FileProgress>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProgress {
    pub file_id: String,
    pub name: String,
    pub received: usize,
    pub total: usize,
    pub complete: bool,
}

impl From<&UploadSession> for SessionProgress {
    fn from(session: &UploadSession) -> Self {
        Self {
            session_id: session.id.clone(),
            files: session
                .files
                .iter()
                .map(|(file_id, file)| FileProgress {
                    file_id: file_id.clone(),
                    name: file.name.clone(),
                    received: file.received(),
                    total: file.total,
                    complete: file.is_complete(),
                })
                .collect(),
            created_at: session.created_at,
            last_activity: session.last_activity,
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Upload error types
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Session not found")]
    SessionNotFound(String),

    #[error("Session already committed: {0}")]
    SessionCommitted(String),

    #[error("Chunk index out of bounds: {index} (total: {total})")]
    ChunkIndexOutOfBounds { index: usize, total: usize },

    #[error("Invalid chunk total: {0}")]
    InvalidTotal(usize),

    #[error("Chunk total mismatch for {file_id}: expected {expected}, got {actual}")]
    TotalMismatch {
        file_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Empty chunk payload")]
    EmptyChunk,

    #[error("Incomplete upload for {file}: missing chunks {missing:?}")]
    IncompleteUpload { file: String, missing: Vec<usize> },
}

impl UploadError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::SessionCommitted(_) => "SESSION_COMMITTED",
            Self::ChunkIndexOutOfBounds { .. } => "CHUNK_INDEX_OUT_OF_BOUNDS",
            Self::InvalidTotal(_) => "INVALID_TOTAL",
            Self::TotalMismatch { .. } => "TOTAL_MISMATCH",
            Self::EmptyChunk => "EMPTY_CHUNK",
            Self::IncompleteUpload { .. } => "INCOMPLETE_UPLOAD",
        }
    }
}
