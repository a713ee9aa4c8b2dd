//! # Voice Transcription Service
//!
//! The facade that owns the whole pipeline: voice buffer, activity
//! tracker, task queue, STT provider, result dispatcher, and the worker
//! pool. The connection layer constructs one instance, injects it wherever
//! audio arrives, and interacts with it through four calls: `ingest`,
//! `register_listener`, `unregister_listener`, and `stats`.
//!
//! ## Lifecycle:
//! stopped -> running -> stopped. `start()` spawns the workers; `ingest()`
//! outside the running state is rejected; `stop()` signals shutdown and
//! waits for workers up to a grace period, then detaches whatever is still
//! in flight. There is no paused state.
//!
//! The service is an explicitly constructed, owned instance rather than a
//! global singleton, so lifecycle and test isolation stay in the caller's
//! hands.

use crate::audio::activity::ActivityTracker;
use crate::audio::buffer::VoiceBuffer;
use crate::audio::chunk::{AudioChunk, SessionKey};
use crate::config::VoiceConfig;
use crate::dispatcher::{ResultDispatcher, TranscriptListener};
use crate::error::{VoiceError, VoiceResult};
use crate::provider::{build_provider, SpeechProvider};
use crate::queue::{TaskQueue, TranscriptionTask};
use crate::worker::{run_worker, WorkerContext};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Snapshot of pipeline health for monitoring endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub running: bool,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub worker_count: usize,
    /// Sessions with live activity state (received audio, not yet removed)
    pub active_sessions: usize,
    pub registered_listeners: usize,
    pub chunks_ingested: u64,
    /// Chunks dropped for malformed payloads
    pub chunks_rejected: u64,
    pub tasks_enqueued: u64,
    /// Tasks dropped because the queue was full
    pub tasks_dropped: u64,
    pub results_dispatched: u64,
    /// Results dropped by the confidence filter
    pub results_filtered: u64,
    pub uptime_seconds: u64,
}

/// The real-time transcription pipeline.
pub struct VoiceTranscriptionService {
    config: VoiceConfig,
    buffer: VoiceBuffer,
    tracker: ActivityTracker,
    queue: Arc<TaskQueue>,
    provider: Arc<dyn SpeechProvider>,
    dispatcher: Arc<ResultDispatcher>,

    running: AtomicBool,
    shutdown: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,

    chunks_ingested: AtomicU64,
    chunks_rejected: AtomicU64,
    created_at: Instant,
}

impl VoiceTranscriptionService {
    /// Build the service with the backend named in the configuration.
    ///
    /// Fails fast on invalid configuration or an unknown backend: a
    /// configuration defect, caught before any audio is accepted.
    pub fn new(config: VoiceConfig) -> VoiceResult<Self> {
        config.validate()?;
        let provider = build_provider(&config.provider, config.audio.sample_rate)?;
        Self::with_provider(config, provider)
    }

    /// Build the service around a pre-built provider. This is the
    /// dependency-injection seam used by tests and by embedders that
    /// construct backends themselves.
    pub fn with_provider(
        config: VoiceConfig,
        provider: Arc<dyn SpeechProvider>,
    ) -> VoiceResult<Self> {
        config.validate()?;

        Ok(Self {
            buffer: VoiceBuffer::new(config.pipeline.buffer_max_chunks),
            tracker: ActivityTracker::new(
                Duration::from_millis(config.pipeline.flush_interval_ms),
                config.pipeline.chunk_threshold,
            ),
            queue: Arc::new(TaskQueue::new(config.pipeline.queue_capacity)),
            dispatcher: Arc::new(ResultDispatcher::new(config.pipeline.confidence_threshold)),
            provider,
            running: AtomicBool::new(false),
            shutdown: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
            chunks_ingested: AtomicU64::new(0),
            chunks_rejected: AtomicU64::new(0),
            created_at: Instant::now(),
            config,
        })
    }

    /// Spawn the worker pool and enter the running state.
    pub fn start(&self) -> VoiceResult<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VoiceError::InvalidState(
                "service is already running".to_string(),
            ));
        }

        self.shutdown.store(false, Ordering::SeqCst);

        let mut workers = self.workers.lock().unwrap();
        for worker_id in 0..self.config.pipeline.worker_count {
            let ctx = WorkerContext {
                queue: Arc::clone(&self.queue),
                provider: Arc::clone(&self.provider),
                dispatcher: Arc::clone(&self.dispatcher),
                shutdown: Arc::clone(&self.shutdown),
            };
            workers.push(tokio::spawn(run_worker(worker_id, ctx)));
        }

        tracing::info!(
            backend = self.provider.name(),
            workers = self.config.pipeline.worker_count,
            "Voice transcription service started"
        );
        Ok(())
    }

    /// Signal workers to exit and wait for them to drain the queued
    /// backlog, up to one grace deadline shared by all workers. In-flight
    /// provider calls are not aborted; workers that outlive the deadline
    /// are detached.
    pub async fn stop(&self) -> VoiceResult<()> {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VoiceError::InvalidState(
                "service is not running".to_string(),
            ));
        }

        self.shutdown.store(true, Ordering::SeqCst);

        let handles: Vec<JoinHandle<()>> = self.workers.lock().unwrap().drain(..).collect();
        let grace = Duration::from_millis(self.config.pipeline.shutdown_grace_ms);
        let deadline = tokio::time::Instant::now() + grace;

        for handle in handles {
            if tokio::time::timeout_at(deadline, handle).await.is_err() {
                tracing::warn!("Worker did not stop within the grace period, detaching");
            }
        }

        tracing::info!("Voice transcription service stopped");
        Ok(())
    }

    /// Accept one audio chunk. Fire-and-forget from the caller's point of
    /// view: this never blocks and never fails on data conditions.
    /// Malformed payloads are counted and dropped, and a full queue drops
    /// the flushed task, not the call.
    ///
    /// Rejected only when the service is not running, which is a lifecycle
    /// misuse by the embedder rather than a runtime condition.
    pub fn ingest(&self, chunk: AudioChunk) -> VoiceResult<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(VoiceError::InvalidState(
                "service is not running".to_string(),
            ));
        }

        if let Err(reason) = chunk.validate_payload() {
            self.chunks_rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(session = %chunk.session, "Rejected audio chunk: {}", reason);
            return Ok(());
        }

        self.chunks_ingested.fetch_add(1, Ordering::Relaxed);

        let session = chunk.session;
        let chunk_id = chunk.chunk_id;
        let is_final = chunk.is_final;

        self.buffer.append(chunk);

        let should_flush = if is_final {
            // Final chunks always flush, regardless of counters
            self.tracker.note_final(session);
            true
        } else {
            self.tracker.note_chunk(session)
        };

        if should_flush {
            let audio = self.buffer.drain(session);
            if !audio.is_empty() {
                self.queue
                    .enqueue(TranscriptionTask::new(session, chunk_id, audio, is_final));
            }
            if is_final {
                // Queued first, then cleared: the next session under this
                // key must not pick up stale audio
                self.buffer.clear(session);
            }
        }

        Ok(())
    }

    /// Register the delivery callback for a session.
    pub fn register_listener(&self, session: SessionKey, listener: TranscriptListener) {
        self.dispatcher.register(session, listener);
    }

    /// Remove a session's callback and garbage-collect its activity state.
    /// Results of in-flight tasks for this session will be discarded
    /// silently.
    pub fn unregister_listener(&self, session: SessionKey) {
        self.dispatcher.unregister(session);
        self.tracker.remove(session);
    }

    /// Snapshot of pipeline counters and gauges.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            running: self.running.load(Ordering::SeqCst),
            queue_depth: self.queue.depth(),
            queue_capacity: self.queue.capacity(),
            worker_count: self.config.pipeline.worker_count,
            active_sessions: self.tracker.active_sessions(),
            registered_listeners: self.dispatcher.listener_count(),
            chunks_ingested: self.chunks_ingested.load(Ordering::Relaxed),
            chunks_rejected: self.chunks_rejected.load(Ordering::Relaxed),
            tasks_enqueued: self.queue.enqueued_total(),
            tasks_dropped: self.queue.dropped_total(),
            results_dispatched: self.dispatcher.dispatched_total(),
            results_filtered: self.dispatcher.filtered_total(),
            uptime_seconds: self.created_at.elapsed().as_secs(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::TranscriptEvent;
    use crate::provider::testing::MockProvider;
    use std::sync::Mutex as StdMutex;

    fn test_config() -> VoiceConfig {
        let mut config = VoiceConfig::default();
        config.pipeline.chunk_threshold = 3;
        config.pipeline.flush_interval_ms = 60_000; // count-driven in tests
        config.pipeline.confidence_threshold = 0.7;
        config.pipeline.worker_count = 1;
        config
    }

    fn collecting_listener() -> (TranscriptListener, Arc<StdMutex<Vec<TranscriptEvent>>>) {
        let events: Arc<StdMutex<Vec<TranscriptEvent>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let listener: TranscriptListener =
            Arc::new(move |event| sink.lock().unwrap().push(event));
        (listener, events)
    }

    fn chunk(session: SessionKey, chunk_id: u64, payload: Vec<u8>, is_final: bool) -> AudioChunk {
        AudioChunk::new(session, chunk_id, payload, 16000, is_final)
    }

    async fn wait_for_events(events: &Arc<StdMutex<Vec<TranscriptEvent>>>, count: usize) {
        for _ in 0..50 {
            if events.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "expected {} events, got {}",
            count,
            events.lock().unwrap().len()
        );
    }

    #[test]
    fn test_unknown_backend_fails_at_construction() {
        let mut config = test_config();
        config.provider.backend = "telepathy".to_string();
        assert!(VoiceTranscriptionService::new(config).is_err());
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let mut config = test_config();
        config.pipeline.worker_count = 0;
        let result = VoiceTranscriptionService::with_provider(
            config,
            Arc::new(MockProvider::new("hi", 0.9)),
        );
        assert!(matches!(result, Err(VoiceError::Config(_))));
    }

    #[tokio::test]
    async fn test_ingest_rejected_when_stopped() {
        let service = VoiceTranscriptionService::with_provider(
            test_config(),
            Arc::new(MockProvider::new("hi", 0.9)),
        )
        .unwrap();

        let result = service.ingest(chunk(SessionKey::new(1, 1), 0, vec![0, 0], false));
        assert!(matches!(result, Err(VoiceError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_end_to_end_count_flush() {
        let provider = Arc::new(MockProvider::new("hello", 0.95));
        let service = VoiceTranscriptionService::with_provider(
            test_config(),
            Arc::clone(&provider) as Arc<dyn SpeechProvider>,
        )
        .unwrap();
        service.start().unwrap();

        let session = SessionKey::new(1, 1);
        let (listener, events) = collecting_listener();
        service.register_listener(session, listener);

        service.ingest(chunk(session, 1, vec![0x01, 0x01], false)).unwrap();
        service.ingest(chunk(session, 2, vec![0x02, 0x02], false)).unwrap();
        service.ingest(chunk(session, 3, vec![0x03, 0x03], false)).unwrap();

        wait_for_events(&events, 1).await;
        {
            let events = events.lock().unwrap();
            match &events[0] {
                TranscriptEvent::Transcript(result) => {
                    assert_eq!(result.text, "hello");
                    assert!((result.confidence - 0.95).abs() < 1e-6);
                    assert!(!result.is_final);
                    assert_eq!(result.chunk_id, 3);
                }
                other => panic!("expected transcript, got {:?}", other),
            }
        }

        // Exactly one task, containing c1+c2+c3 in arrival order
        let received = provider.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], vec![0x01, 0x01, 0x02, 0x02, 0x03, 0x03]);

        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_final_chunk_flushes_and_clears() {
        let provider = Arc::new(MockProvider::new("done", 0.95));
        let service = VoiceTranscriptionService::with_provider(
            test_config(),
            Arc::clone(&provider) as Arc<dyn SpeechProvider>,
        )
        .unwrap();
        service.start().unwrap();

        let session = SessionKey::new(1, 1);
        let (listener, events) = collecting_listener();
        service.register_listener(session, listener);

        // One final chunk flushes immediately despite chunk_threshold=3
        service.ingest(chunk(session, 1, vec![0xAA, 0xAA], true)).unwrap();
        wait_for_events(&events, 1).await;
        match &events.lock().unwrap()[0] {
            TranscriptEvent::Transcript(result) => assert!(result.is_final),
            other => panic!("expected transcript, got {:?}", other),
        }

        // The buffer was cleared: a fresh count-driven flush contains only
        // the new session's bytes
        service.ingest(chunk(session, 2, vec![0x01, 0x01], false)).unwrap();
        service.ingest(chunk(session, 3, vec![0x02, 0x02], false)).unwrap();
        service.ingest(chunk(session, 4, vec![0x03, 0x03], false)).unwrap();
        wait_for_events(&events, 2).await;

        let received = provider.received();
        assert_eq!(received.len(), 2);
        assert_eq!(received[1], vec![0x01, 0x01, 0x02, 0x02, 0x03, 0x03]);

        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_low_confidence_results_never_reach_listener() {
        let service = VoiceTranscriptionService::with_provider(
            test_config(),
            Arc::new(MockProvider::new("mumble", 0.4)),
        )
        .unwrap();
        service.start().unwrap();

        let session = SessionKey::new(1, 1);
        let (listener, events) = collecting_listener();
        service.register_listener(session, listener);

        service.ingest(chunk(session, 1, vec![0x01, 0x01], true)).unwrap();

        // Give the pipeline time to process, then confirm silence
        for _ in 0..20 {
            if service.stats().results_filtered > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(service.stats().results_filtered, 1);

        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stats_reflect_pipeline_state() {
        let service = VoiceTranscriptionService::with_provider(
            test_config(),
            Arc::new(MockProvider::new("hi", 0.9)),
        )
        .unwrap();
        service.start().unwrap();

        let session = SessionKey::new(1, 1);
        let (listener, _events) = collecting_listener();
        service.register_listener(session, listener);

        // Malformed (odd-length) payload is counted and dropped
        service.ingest(chunk(session, 1, vec![0x01], false)).unwrap();
        service.ingest(chunk(session, 2, vec![0x01, 0x01], false)).unwrap();

        let stats = service.stats();
        assert!(stats.running);
        assert_eq!(stats.worker_count, 1);
        assert_eq!(stats.chunks_ingested, 1);
        assert_eq!(stats.chunks_rejected, 1);
        assert_eq!(stats.registered_listeners, 1);
        assert_eq!(stats.active_sessions, 1);

        service.unregister_listener(session);
        let stats = service.stats();
        assert_eq!(stats.registered_listeners, 0);
        assert_eq!(stats.active_sessions, 0);

        service.stop().await.unwrap();
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_stop_grace_bounds_total_wait_across_workers() {
        let mut config = test_config();
        config.pipeline.worker_count = 4;
        // Shorter than the workers' dequeue poll, so every join hits the
        // deadline; the total wait must still be one grace period, not one
        // per worker
        config.pipeline.shutdown_grace_ms = 100;
        let service = VoiceTranscriptionService::with_provider(
            config,
            Arc::new(MockProvider::new("hi", 0.9)),
        )
        .unwrap();
        service.start().unwrap();

        let started = std::time::Instant::now();
        service.stop().await.unwrap();
        assert!(
            started.elapsed() < Duration::from_millis(300),
            "stop took {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let service = VoiceTranscriptionService::with_provider(
            test_config(),
            Arc::new(MockProvider::new("hi", 0.9)),
        )
        .unwrap();

        assert!(service.stop().await.is_err());
        service.start().unwrap();
        assert!(service.start().is_err());
        service.stop().await.unwrap();

        // The cycle can restart
        service.start().unwrap();
        service.stop().await.unwrap();
    }
}
