//! # Audio Chunk Data Model
//!
//! The arrival unit of the pipeline: raw audio bytes wrapped with session
//! identity, ordering, and a final-fragment flag. Chunks are immutable once
//! created and owned exclusively by the voice buffer until consumed into a
//! transcription task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one logical audio stream: a user speaking within one
/// interview. All buffering, batching, and listener registration is keyed
/// by this tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub user_id: u64,
    pub interview_id: u64,
}

impl SessionKey {
    pub fn new(user_id: u64, interview_id: u64) -> Self {
        Self {
            user_id,
            interview_id,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}/i{}", self.user_id, self.interview_id)
    }
}

/// One arrival unit of raw audio belonging to a session.
///
/// `chunk_id` is the caller-assigned sequence number within the session;
/// the pipeline uses it to tag results, not to reorder arrivals.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub session: SessionKey,
    pub chunk_id: u64,
    pub payload: Vec<u8>,
    pub sample_rate: u32,
    pub is_final: bool,
    pub received_at: DateTime<Utc>,
}

impl AudioChunk {
    pub fn new(
        session: SessionKey,
        chunk_id: u64,
        payload: Vec<u8>,
        sample_rate: u32,
        is_final: bool,
    ) -> Self {
        Self {
            session,
            chunk_id,
            payload,
            sample_rate,
            is_final,
            received_at: Utc::now(),
        }
    }

    /// Check that the payload is plausible 16-bit PCM.
    ///
    /// A final chunk may legitimately carry no audio (it only signals end of
    /// stream); any other chunk must be non-empty, and all payloads must
    /// have an even byte count for 16-bit samples.
    pub fn validate_payload(&self) -> Result<(), String> {
        if self.payload.is_empty() && !self.is_final {
            return Err("Audio chunk payload is empty".to_string());
        }

        if self.payload.len() % 2 != 0 {
            return Err("Audio payload length must be even for 16-bit samples".to_string());
        }

        Ok(())
    }
}
