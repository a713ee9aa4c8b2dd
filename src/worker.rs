//! # Transcription Worker
//!
//! The consumer side of the task queue. Each worker repeatedly pulls a
//! task (with a short timeout so shutdown is observable), blocks on the
//! configured provider's `transcribe` call, stamps the task's session and
//! flush metadata onto the transcript, and hands the result to the
//! dispatcher. Shutdown drains: a worker exits only after the queue is
//! empty, bounded by the service's stop grace period.
//!
//! A slow backend call stalls only the worker processing it; queued tasks
//! wait their turn. That head-of-line latency is an accepted tradeoff for
//! single-worker deployments, and the worker count is a configuration knob
//! for scaling out. Workers do NOT serialize per-session execution: with
//! more than one worker, two flushes for the same session can complete out
//! of order.

use crate::dispatcher::{ResultDispatcher, TranscriptionResult};
use crate::provider::SpeechProvider;
use crate::queue::TaskQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// How long a worker waits on the queue before re-checking shutdown.
const DEQUEUE_WAIT: Duration = Duration::from_millis(200);

/// Everything one worker needs, shared across the pool.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub queue: Arc<TaskQueue>,
    pub provider: Arc<dyn SpeechProvider>,
    pub dispatcher: Arc<ResultDispatcher>,
    pub shutdown: Arc<AtomicBool>,
}

/// The worker loop. Once the shutdown flag is set, the worker keeps
/// draining tasks already accepted into the queue and exits only when the
/// queue runs dry; `stop()`'s grace deadline bounds how long that drain may
/// take. An in-flight provider call is never aborted, it finishes (or times
/// out internally) before the queue is polled again.
pub(crate) async fn run_worker(worker_id: usize, ctx: WorkerContext) {
    tracing::info!(
        worker = worker_id,
        backend = ctx.provider.name(),
        "Transcription worker started"
    );

    loop {
        let task = match ctx.queue.dequeue(DEQUEUE_WAIT).await {
            Some(task) => task,
            None => {
                // Exit only once the backlog is drained, so tasks accepted
                // before shutdown still produce results
                if ctx.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                continue;
            }
        };

        let start = Instant::now();
        let transcript = ctx.provider.transcribe(&task.audio).await;
        let processing_time_ms = start.elapsed().as_millis() as u64;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        tracing::debug!(
            worker = worker_id,
            session = %task.session,
            task = %task.task_id,
            chars = transcript.text.len(),
            confidence = transcript.confidence,
            elapsed_ms = processing_time_ms,
            "Transcription completed"
        );

        ctx.dispatcher.dispatch(TranscriptionResult {
            session: task.session,
            chunk_id: task.chunk_id,
            text: transcript.text,
            confidence: transcript.confidence,
            is_final: task.is_final,
            language: transcript.language,
            timestamp,
            processing_time_ms,
            backend: ctx.provider.name().to_string(),
        });
    }

    tracing::info!(worker = worker_id, "Transcription worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::chunk::SessionKey;
    use crate::dispatcher::{TranscriptEvent, TranscriptListener};
    use crate::provider::testing::MockProvider;
    use crate::queue::TranscriptionTask;
    use std::sync::Mutex;

    fn collecting_listener() -> (TranscriptListener, Arc<Mutex<Vec<TranscriptEvent>>>) {
        let events: Arc<Mutex<Vec<TranscriptEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let listener: TranscriptListener =
            Arc::new(move |event| sink.lock().unwrap().push(event));
        (listener, events)
    }

    async fn wait_for_events(
        events: &Arc<Mutex<Vec<TranscriptEvent>>>,
        count: usize,
    ) {
        for _ in 0..50 {
            if events.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected {} events, got {}", count, events.lock().unwrap().len());
    }

    #[tokio::test]
    async fn test_worker_processes_and_dispatches() {
        let session = SessionKey::new(1, 1);
        let queue = Arc::new(TaskQueue::new(8));
        let dispatcher = Arc::new(ResultDispatcher::new(0.7));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (listener, events) = collecting_listener();
        dispatcher.register(session, listener);

        let ctx = WorkerContext {
            queue: Arc::clone(&queue),
            provider: Arc::new(MockProvider::new("hello", 0.95)),
            dispatcher: Arc::clone(&dispatcher),
            shutdown: Arc::clone(&shutdown),
        };
        let handle = tokio::spawn(run_worker(0, ctx));

        queue.enqueue(TranscriptionTask::new(session, 3, vec![1, 2, 3, 4], false));
        wait_for_events(&events, 1).await;

        let events = events.lock().unwrap();
        match &events[0] {
            TranscriptEvent::Transcript(result) => {
                assert_eq!(result.text, "hello");
                assert_eq!(result.chunk_id, 3);
                assert_eq!(result.backend, "mock");
                assert!(!result.is_final);
            }
            other => panic!("expected transcript, got {:?}", other),
        }
        drop(events);

        shutdown.store(true, Ordering::SeqCst);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_backlog() {
        let session = SessionKey::new(1, 1);
        let queue = Arc::new(TaskQueue::new(8));
        let dispatcher = Arc::new(ResultDispatcher::new(0.7));
        // Shutdown is already signalled before the worker ever runs; the
        // backlog must still be processed, not abandoned
        let shutdown = Arc::new(AtomicBool::new(true));
        let (listener, events) = collecting_listener();
        dispatcher.register(session, listener);

        queue.enqueue(TranscriptionTask::new(session, 1, vec![1, 2], false));
        queue.enqueue(TranscriptionTask::new(session, 2, vec![3, 4], false));
        queue.enqueue(TranscriptionTask::new(session, 3, vec![5, 6], true));

        let ctx = WorkerContext {
            queue: Arc::clone(&queue),
            provider: Arc::new(MockProvider::new("hello", 0.95)),
            dispatcher: Arc::clone(&dispatcher),
            shutdown,
        };
        // Awaited directly: the loop returns only once the queue is dry
        run_worker(0, ctx).await;

        assert_eq!(queue.depth(), 0);
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        match &events[2] {
            TranscriptEvent::Transcript(result) => {
                assert_eq!(result.chunk_id, 3);
                assert!(result.is_final);
            }
            other => panic!("expected transcript, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backend_failure_does_not_stop_the_loop() {
        let session = SessionKey::new(1, 1);
        let queue = Arc::new(TaskQueue::new(8));
        // Threshold 0.0 so even failed (zero-confidence) results deliver,
        // letting the test observe both outcomes
        let dispatcher = Arc::new(ResultDispatcher::new(0.0));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (listener, events) = collecting_listener();
        dispatcher.register(session, listener);

        let ctx = WorkerContext {
            queue: Arc::clone(&queue),
            provider: Arc::new(MockProvider::new("hello", 0.95)),
            dispatcher: Arc::clone(&dispatcher),
            shutdown: Arc::clone(&shutdown),
        };
        let handle = tokio::spawn(run_worker(0, ctx));

        // MockProvider treats an empty payload as a backend failure
        queue.enqueue(TranscriptionTask::new(session, 1, vec![], false));
        queue.enqueue(TranscriptionTask::new(session, 2, vec![1, 2], false));
        wait_for_events(&events, 2).await;

        let events = events.lock().unwrap();
        match &events[0] {
            TranscriptEvent::Transcript(result) => {
                assert!(result.text.is_empty());
                assert_eq!(result.confidence, 0.0);
            }
            other => panic!("expected transcript, got {:?}", other),
        }
        match &events[1] {
            TranscriptEvent::Transcript(result) => assert_eq!(result.text, "hello"),
            other => panic!("expected transcript, got {:?}", other),
        }
        drop(events);

        shutdown.store(true, Ordering::SeqCst);
        handle.await.unwrap();
    }
}
