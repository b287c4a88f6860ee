use crate::transport::VoiceChunk;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Record of the single active voice session and the chunks buffered while
/// the transport is down.
///
/// Constructed once and shared (`Arc`) between the transport and the session;
/// every mutation goes through one internal lock so capture-side and
/// socket-side tasks never interleave mid-update.
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
    capacity: usize,
}

struct RegistryInner {
    current: Option<String>,
    pending: VecDeque<VoiceChunk>,
    dropped: u64,
}

impl SessionRegistry {
    /// Create a registry whose pending buffer holds at most
    /// `max_pending_chunks` chunks. A capacity of 0 buffers nothing.
    pub fn new(max_pending_chunks: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                current: None,
                pending: VecDeque::new(),
                dropped: 0,
            }),
            capacity: max_pending_chunks,
        }
    }

    /// Record `id` as the active session, replacing any previous one
    pub async fn set_session(&self, id: String) {
        let mut inner = self.inner.lock().await;
        if let Some(previous) = inner.current.replace(id.clone()) {
            debug!(previous = %previous, "replacing active session");
        }
        info!(session_id = %id, "session registered");
    }

    /// The active session id, if any
    pub async fn current_session(&self) -> Option<String> {
        self.inner.lock().await.current.clone()
    }

    /// Clear the active session, but only if it is still `id`; a session that
    /// already handed over to a successor must not clobber it
    pub async fn clear_session(&self, id: &str) {
        let mut inner = self.inner.lock().await;
        if inner.current.as_deref() == Some(id) {
            inner.current = None;
            info!(session_id = %id, "session cleared");
        }
    }

    /// Stale-session guard: is `id` still the active session?
    pub async fn is_current(&self, id: &str) -> bool {
        self.inner.lock().await.current.as_deref() == Some(id)
    }

    /// Append a chunk to the pending buffer. At capacity the oldest chunk is
    /// dropped and counted.
    pub async fn add_pending(&self, chunk: VoiceChunk) {
        let mut inner = self.inner.lock().await;
        if self.capacity == 0 {
            inner.dropped += 1;
            debug!(seq = chunk.seq, "pending buffer disabled, dropping chunk");
            return;
        }
        while inner.pending.len() >= self.capacity {
            if let Some(oldest) = inner.pending.pop_front() {
                inner.dropped += 1;
                debug!(
                    seq = oldest.seq,
                    session_id = %oldest.session_id,
                    "pending buffer full, dropping oldest chunk"
                );
            }
        }
        inner.pending.push_back(chunk);
    }

    /// Atomically remove and return all buffered chunks in enqueue order
    pub async fn drain_pending(&self) -> Vec<VoiceChunk> {
        let mut inner = self.inner.lock().await;
        inner.pending.drain(..).collect()
    }

    /// Return chunks the transport pulled but could not send to the front of
    /// the buffer, preserving their order ahead of anything buffered since.
    /// Bypasses the capacity check: in-flight chunks are not re-dropped here.
    pub async fn restore_front(&self, chunks: Vec<VoiceChunk>) {
        if chunks.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().await;
        debug!(count = chunks.len(), "restoring unsent chunks to the buffer");
        for chunk in chunks.into_iter().rev() {
            inner.pending.push_front(chunk);
        }
    }

    /// Number of chunks currently buffered
    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    /// Total chunks dropped by the overflow policy since construction
    pub async fn dropped_count(&self) -> u64 {
        self.inner.lock().await.dropped
    }
}
