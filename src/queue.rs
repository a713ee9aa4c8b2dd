//! # Transcription Task Queue
//!
//! The bounded handoff point between chunk arrival and transcription
//! execution. Producers run on connection-handling tasks and must never
//! block, so enqueue is a `try_send`: when the queue is full the task is
//! dropped, a warning is logged, and an overflow counter increments.
//! Backpressure is "drop newest, log, continue".
//!
//! The queue is FIFO across all sessions. It makes no ordering promise
//! *between* sessions beyond arrival order, and with multiple workers two
//! tasks for the same session may complete out of order.

use crate::audio::chunk::SessionKey;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// The unit handed to a worker: one flush's concatenated audio for one
/// session. Created at flush time, consumed exactly once, never persisted.
#[derive(Debug)]
pub struct TranscriptionTask {
    pub task_id: Uuid,
    pub session: SessionKey,
    /// Sequence number of the chunk that triggered this flush
    pub chunk_id: u64,
    pub audio: Vec<u8>,
    pub is_final: bool,
}

impl TranscriptionTask {
    pub fn new(session: SessionKey, chunk_id: u64, audio: Vec<u8>, is_final: bool) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            session,
            chunk_id,
            audio,
            is_final,
        }
    }
}

/// Bounded FIFO queue of transcription tasks.
///
/// The receiver sits behind an async mutex so a small pool of workers can
/// share it; producers only touch the lock-free sender side.
pub struct TaskQueue {
    tx: mpsc::Sender<TranscriptionTask>,
    rx: Arc<Mutex<mpsc::Receiver<TranscriptionTask>>>,
    capacity: usize,
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            capacity,
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue without blocking. Returns `false` when the task was dropped
    /// because the queue is full.
    pub fn enqueue(&self, task: TranscriptionTask) -> bool {
        let session = task.session;
        match self.tx.try_send(task) {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(session = %session, "Task queue full, dropping transcription task");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(session = %session, "Task queue closed, dropping transcription task");
                false
            }
        }
    }

    /// Pull the next task, waiting at most `wait`. Returns `None` on
    /// timeout so worker loops regain control to observe shutdown.
    pub async fn dequeue(&self, wait: Duration) -> Option<TranscriptionTask> {
        let rx = Arc::clone(&self.rx);
        match tokio::time::timeout(wait, async move { rx.lock().await.recv().await }).await {
            Ok(task) => task,
            Err(_) => None,
        }
    }

    /// Number of tasks currently waiting in the queue.
    pub fn depth(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total tasks accepted since construction.
    pub fn enqueued_total(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Total tasks dropped due to overflow since construction.
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
