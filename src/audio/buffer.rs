//! # Voice Buffer
//!
//! Holds recently received audio chunks for all sessions and assembles
//! "everything buffered for session X" into one contiguous payload at flush
//! time.
//!
//! ## Capacity policy:
//! The buffer enforces a *global* chunk cap: once the total count across all
//! sessions exceeds the configured maximum, the single oldest chunk in the
//! buffer is evicted, whichever session it belongs to. A noisy session can
//! therefore push out a quiet session's old audio. The cap lives entirely
//! inside `append`, so switching to a per-session cap would not touch any
//! caller.
//!
//! ## Thread Safety:
//! One mutex guards every operation. All three operations are pure
//! in-memory list work, so the critical sections are short and producer
//! contention is brief.

use crate::audio::chunk::{AudioChunk, SessionKey};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Shared chunk store for all active sessions.
pub struct VoiceBuffer {
    chunks: Mutex<VecDeque<AudioChunk>>,
    max_chunks: usize,
}

impl VoiceBuffer {
    pub fn new(max_chunks: usize) -> Self {
        Self {
            chunks: Mutex::new(VecDeque::with_capacity(max_chunks)),
            max_chunks,
        }
    }

    /// Add a chunk, evicting the single oldest chunk across all sessions if
    /// the global cap is exceeded.
    pub fn append(&self, chunk: AudioChunk) {
        let mut chunks = self.chunks.lock().unwrap();
        chunks.push_back(chunk);

        if chunks.len() > self.max_chunks {
            if let Some(evicted) = chunks.pop_front() {
                tracing::warn!(
                    session = %evicted.session,
                    chunk_id = evicted.chunk_id,
                    "Buffer cap reached, evicted oldest chunk"
                );
            }
        }
    }

    /// Concatenate, in arrival order, the payloads of every buffered chunk
    /// belonging to `session`. Returns empty bytes if none match.
    ///
    /// Does not remove anything; `clear` is the only destructive call.
    pub fn drain(&self, session: SessionKey) -> Vec<u8> {
        let chunks = self.chunks.lock().unwrap();
        let mut audio = Vec::new();
        for chunk in chunks.iter().filter(|c| c.session == session) {
            audio.extend_from_slice(&chunk.payload);
        }
        audio
    }

    /// Remove every chunk belonging to `session`. Called after a final
    /// flush so a later session under the same key cannot pick up stale
    /// audio.
    pub fn clear(&self, session: SessionKey) {
        let mut chunks = self.chunks.lock().unwrap();
        chunks.retain(|c| c.session != session);
    }

    /// Total buffered chunk count across all sessions.
    pub fn len(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.lock().unwrap().is_empty()
    }
}
