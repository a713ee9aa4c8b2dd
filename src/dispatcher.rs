//! # Result Dispatcher
//!
//! Registry of session listeners and the delivery point for transcription
//! results. Delivery is fire-and-forget with at most one attempt per
//! result: no retries, no acknowledgments, no buffering for absent
//! listeners.
//!
//! ## Delivery rules:
//! - Results below the confidence threshold are dropped before lookup;
//!   they are not an error, just unusable audio.
//! - A result whose session has no registered listener is discarded
//!   silently (the session unregistered while tasks were in flight).
//! - A *final* result additionally fans out as a live-caption event to
//!   every other listener registered under the same interview; rendering
//!   or rebroadcasting the caption is the connection layer's job.
//!
//! The registry is read on every result but written only at session
//! start/end, so it sits behind a reader-writer lock.

use crate::audio::chunk::SessionKey;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// A completed transcription, stamped with the session identity and flush
/// metadata, ready to be pushed to the remote peer.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResult {
    pub session: SessionKey,
    /// Sequence number of the chunk that triggered the flush
    pub chunk_id: u64,
    pub text: String,
    pub confidence: f32,
    pub is_final: bool,
    pub language: String,
    /// Completion time, seconds since the Unix epoch
    pub timestamp: u64,
    pub processing_time_ms: u64,
    /// Which backend produced this result
    pub backend: String,
}

/// What a registered listener receives.
#[derive(Debug, Clone)]
pub enum TranscriptEvent {
    /// A transcription of this session's own audio
    Transcript(TranscriptionResult),

    /// A final transcript from another participant in the same interview,
    /// for live-caption display
    LiveCaption {
        speaker: SessionKey,
        result: TranscriptionResult,
    },
}

/// Delivery callback registered by the connection layer for one session.
pub type TranscriptListener = Arc<dyn Fn(TranscriptEvent) + Send + Sync>;

/// Maps sessions to their delivery callbacks and applies the confidence
/// filter.
pub struct ResultDispatcher {
    listeners: RwLock<HashMap<SessionKey, TranscriptListener>>,
    confidence_threshold: f32,
    dispatched: AtomicU64,
    filtered: AtomicU64,
}

impl ResultDispatcher {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            confidence_threshold,
            dispatched: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
        }
    }

    /// Register (or replace) the listener for a session.
    pub fn register(&self, session: SessionKey, listener: TranscriptListener) {
        self.listeners.write().unwrap().insert(session, listener);
        tracing::debug!(session = %session, "Listener registered");
    }

    /// Remove a session's listener. Results for in-flight tasks will find
    /// no listener and be discarded silently.
    pub fn unregister(&self, session: SessionKey) {
        self.listeners.write().unwrap().remove(&session);
        tracing::debug!(session = %session, "Listener unregistered");
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap().len()
    }

    /// Total results delivered to a listener.
    pub fn dispatched_total(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Total results dropped by the confidence filter.
    pub fn filtered_total(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }

    /// Deliver one result, applying the confidence filter and the
    /// final-result caption fan-out.
    pub fn dispatch(&self, result: TranscriptionResult) {
        if result.confidence < self.confidence_threshold {
            self.filtered.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                session = %result.session,
                confidence = result.confidence,
                "Result below confidence threshold, dropped"
            );
            return;
        }

        // Clone what we need out of the registry so callbacks run without
        // holding the lock (a callback may itself register/unregister).
        let (owner, peers) = {
            let listeners = self.listeners.read().unwrap();
            let owner = listeners.get(&result.session).cloned();
            let peers: Vec<(SessionKey, TranscriptListener)> = if result.is_final {
                listeners
                    .iter()
                    .filter(|(key, _)| {
                        key.interview_id == result.session.interview_id
                            && **key != result.session
                    })
                    .map(|(key, listener)| (*key, Arc::clone(listener)))
                    .collect()
            } else {
                Vec::new()
            };
            (owner, peers)
        };

        match owner {
            Some(listener) => {
                listener(TranscriptEvent::Transcript(result.clone()));
                self.dispatched.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                tracing::debug!(session = %result.session, "No listener for result, discarded");
            }
        }

        for (peer, listener) in peers {
            tracing::debug!(speaker = %result.session, peer = %peer, "Live caption fan-out");
            listener(TranscriptEvent::LiveCaption {
                speaker: result.session,
                result: result.clone(),
            });
        }
    }
}
