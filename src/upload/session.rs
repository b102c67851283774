//! Upload Session Store
//!
//! Process-wide registry of in-flight upload sessions:
//! - Outer map guarded by a short-lived synchronous lock
//! - One async mutex per session, held across every mutation of it
//! - Idle sessions evicted by a background sweep

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::types::{
    ChunkAck, ChunkUpload, FileUpload, SessionProgress, SessionStatus, UploadError,
    UploadSession, MAX_CHUNKS_PER_FILE,
};

/// Shared handle to one session's state
pub type SessionHandle = Arc<AsyncMutex<UploadSession>>;

/// Exclusive access to one open session
pub type SessionGuard = OwnedMutexGuard<UploadSession>;

// ============================================================================
// Session Store
// ============================================================================

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Default)]
struct SessionStoreInner {
    /// Sessions indexed by client-supplied ID
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Session Lifecycle
    // ========================================================================

    /// Store one chunk, creating the session and file records on first sight.
    pub async fn append_chunk(&self, chunk: ChunkUpload) -> Result<ChunkAck, UploadError> {
        if chunk.total == 0 || chunk.total > MAX_CHUNKS_PER_FILE {
            return Err(UploadError::InvalidTotal(chunk.total));
        }
        if chunk.index >= chunk.total {
            return Err(UploadError::ChunkIndexOutOfBounds {
                index: chunk.index,
                total: chunk.total,
            });
        }
        if chunk.data.is_empty() {
            return Err(UploadError::EmptyChunk);
        }

        loop {
            let handle = self.get_or_create(&chunk.session_id);
            let mut session = handle.lock().await;

            match session.status {
                SessionStatus::Open => {}
                SessionStatus::Committed => {
                    return Err(UploadError::SessionCommitted(chunk.session_id));
                }
                // Evicted between lookup and lock; start over with a fresh record.
                SessionStatus::Expired => continue,
            }

            let file = session
                .files
                .entry(chunk.file_id.clone())
                .or_insert_with(|| FileUpload::new(chunk.file_name.clone(), chunk.total));

            if file.total != chunk.total {
                return Err(UploadError::TotalMismatch {
                    file_id: chunk.file_id,
                    expected: file.total,
                    actual: chunk.total,
                });
            }

            let overwrite = file.chunks[chunk.index].is_some();
            file.chunks[chunk.index] = Some(chunk.data);

            let ack = ChunkAck {
                ok: true,
                index: chunk.index,
                received: file.received(),
                total: file.total,
            };
            session.last_activity = Utc::now();

            tracing::debug!(
                session_id = %chunk.session_id,
                file_id = %chunk.file_id,
                index = chunk.index,
                received = ack.received,
                total = ack.total,
                overwrite,
                "Chunk stored"
            );

            return Ok(ack);
        }
    }

    /// Look up a session handle
    pub fn get_session(&self, id: &str) -> Result<SessionHandle, UploadError> {
        self.inner
            .sessions
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| UploadError::SessionNotFound(id.to_string()))
    }

    /// Acquire exclusive access to an open session.
    ///
    /// The guard blocks every append to the session until dropped, so the
    /// file set observed through it cannot change underneath the holder.
    pub async fn lock_session(&self, id: &str) -> Result<SessionGuard, UploadError> {
        let handle = self.get_session(id)?;
        let guard = handle.lock_owned().await;

        if guard.status != SessionStatus::Open {
            return Err(UploadError::SessionNotFound(id.to_string()));
        }
        Ok(guard)
    }

    /// Mark a locked session as committed and drop it from the registry.
    pub fn complete_session(&self, mut guard: SessionGuard) {
        guard.status = SessionStatus::Committed;

        let mut sessions = self.inner.sessions.lock();
        let same = sessions
            .get(&guard.id)
            .is_some_and(|handle| Arc::ptr_eq(handle, OwnedMutexGuard::mutex(&guard)));
        if same {
            sessions.remove(&guard.id);
        }

        tracing::info!(
            session_id = %guard.id,
            files = guard.files.len(),
            "Upload session committed"
        );
    }

    /// Remove all state for a session. Returns whether it existed.
    pub fn delete_session(&self, id: &str) -> bool {
        let removed = self.inner.sessions.lock().remove(id).is_some();
        if removed {
            tracing::info!(session_id = %id, "Upload session deleted");
        }
        removed
    }

    // ========================================================================
    // Query Methods
    // ========================================================================

    pub async fn progress(&self, id: &str) -> Result<SessionProgress, UploadError> {
        let handle = self.get_session(id)?;
        let session = handle.lock().await;
        if session.status != SessionStatus::Open {
            return Err(UploadError::SessionNotFound(id.to_string()));
        }
        Ok(SessionProgress::from(&*session))
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Evict sessions idle longer than `ttl`.
    ///
    /// Sessions locked by an in-flight append or commit are left for the next
    /// sweep. Returns the number of sessions evicted.
    pub fn cleanup_expired(&self, ttl: Duration) -> usize {
        let ttl =
            chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36500));
        let now = Utc::now();

        let mut sessions = self.inner.sessions.lock();
        let before = sessions.len();

        sessions.retain(|id, handle| match handle.try_lock() {
            Ok(mut session) if session.is_idle_for(ttl, now) => {
                session.status = SessionStatus::Expired;
                tracing::debug!(session_id = %id, "Evicted idle upload session");
                false
            }
            _ => true,
        });

        let count = before - sessions.len();
        if count > 0 {
            tracing::info!(count = count, "Cleaned up expired upload sessions");
        }
        count
    }

    /// Start background cleanup task
    pub fn start_cleanup_task(self, ttl: Duration, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                self.cleanup_expired(ttl);
            }
        })
    }

    fn get_or_create(&self, id: &str) -> SessionHandle {
        let mut sessions = self.inner.sessions.lock();
        sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::info!(session_id = %id, "Created upload session");
                Arc::new(AsyncMutex::new(UploadSession::new(id)))
            })
            .clone()
    }
}

// ============================================================================
// Tests
// ============================================================================
