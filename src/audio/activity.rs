//! # Session Activity Tracking
//!
//! Per-session counters that drive the flush decision: how many chunks have
//! arrived since the last flush, and when that flush happened. The tracker
//! answers one question for each incoming chunk: should the session's
//! buffered audio be submitted for transcription now?
//!
//! The flush heuristic trades transcription latency against backend call
//! volume; it is a heuristic, not a guarantee.

use crate::audio::chunk::SessionKey;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Mutable per-session counters, lazily created on a session's first chunk.
#[derive(Debug)]
struct SessionActivity {
    chunk_count: u32,
    last_flush: Instant,
}

/// Decides, per incoming chunk, whether to flush the session's buffer.
///
/// One coarse mutex guards the map; the only operations are a lookup, an
/// increment, and an occasional reset, so contention stays negligible at
/// realistic session counts.
pub struct ActivityTracker {
    sessions: Mutex<HashMap<SessionKey, SessionActivity>>,
    flush_interval: Duration,
    chunk_threshold: u32,
}

impl ActivityTracker {
    pub fn new(flush_interval: Duration, chunk_threshold: u32) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            flush_interval,
            chunk_threshold,
        }
    }

    /// Record one non-final chunk for `session` and report whether the
    /// accumulated audio should be flushed.
    ///
    /// Flush fires when the chunk count reaches the threshold OR more than
    /// the flush interval has passed since the session's last flush. Both
    /// counters reset when a flush fires.
    ///
    /// Final chunks bypass this method entirely; they always flush (see
    /// [`ActivityTracker::note_final`]).
    pub fn note_chunk(&self, session: SessionKey) -> bool {
        let mut sessions = self.sessions.lock().unwrap();
        let activity = sessions.entry(session).or_insert_with(|| SessionActivity {
            chunk_count: 0,
            last_flush: Instant::now(),
        });

        activity.chunk_count += 1;

        let should_flush = activity.chunk_count >= self.chunk_threshold
            || activity.last_flush.elapsed() > self.flush_interval;

        if should_flush {
            activity.chunk_count = 0;
            activity.last_flush = Instant::now();
        }

        should_flush
    }

    /// Reset the session's counters after a final chunk forced a flush.
    pub fn note_final(&self, session: SessionKey) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(activity) = sessions.get_mut(&session) {
            activity.chunk_count = 0;
            activity.last_flush = Instant::now();
        }
    }

    /// Drop a session's counters. Called when the session unregisters.
    pub fn remove(&self, session: SessionKey) {
        self.sessions.lock().unwrap().remove(&session);
    }

    /// Number of sessions with live activity state.
    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_by_count() {
        let tracker = ActivityTracker::new(Duration::from_secs(60), 3);
        let session = SessionKey::new(1, 1);

        assert!(!tracker.note_chunk(session));
        assert!(!tracker.note_chunk(session));
        assert!(tracker.note_chunk(session));
        // Counter reset: the cycle starts over
        assert!(!tracker.note_chunk(session));
    }

    #[test]
    fn test_flush_by_time() {
        let tracker = ActivityTracker::new(Duration::from_millis(30), 100);
        let session = SessionKey::new(1, 1);

        assert!(!tracker.note_chunk(session));
        std::thread::sleep(Duration::from_millis(50));
        // Count threshold never reached, but the interval elapsed
        assert!(tracker.note_chunk(session));
    }

    #[test]
    fn test_sessions_tracked_independently() {
        let tracker = ActivityTracker::new(Duration::from_secs(60), 2);
        let a = SessionKey::new(1, 1);
        let b = SessionKey::new(2, 1);

        assert!(!tracker.note_chunk(a));
        assert!(!tracker.note_chunk(b));
        assert!(tracker.note_chunk(a));
        assert!(tracker.note_chunk(b));
        assert_eq!(tracker.active_sessions(), 2);
    }

    #[test]
    fn test_remove_discards_state() {
        let tracker = ActivityTracker::new(Duration::from_secs(60), 2);
        let session = SessionKey::new(1, 1);

        tracker.note_chunk(session);
        tracker.remove(session);
        assert_eq!(tracker.active_sessions(), 0);

        // Fresh state after removal: one chunk does not flush
        assert!(!tracker.note_chunk(session));
    }
}
