//! # Interview Voice Core
//!
//! Real-time voice transcription pipeline for interview sessions. Audio
//! chunks flow in from an external connection layer, are buffered and
//! batched per session, transcribed by a pluggable STT backend, and the
//! results are pushed to registered per-session callbacks after a
//! confidence filter.
//!
//! ## Pipeline stages:
//! 1. **Ingestion**: [`VoiceTranscriptionService::ingest`] validates and
//!    buffers each chunk
//! 2. **Batching**: per-session chunk-count and elapsed-time heuristics
//!    decide when to flush buffered audio into a transcription task
//! 3. **Queueing**: a bounded FIFO queue hands tasks to the worker pool;
//!    overflow drops the newest task rather than blocking producers
//! 4. **Transcription**: workers call the configured backend (hosted API,
//!    local Whisper, or vendor REST)
//! 5. **Dispatch**: results above the confidence threshold reach the
//!    session's listener; final results also fan out as live captions to
//!    the other participants in the interview
//!
//! The crate deliberately has no network surface of its own: websocket or
//! HTTP handling belongs to the embedding service, which talks to this
//! crate through [`VoiceTranscriptionService`].

pub mod audio;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod provider;
pub mod queue;
pub mod service;

mod worker;

pub use audio::{AudioChunk, SessionKey};
pub use config::VoiceConfig;
pub use dispatcher::{TranscriptEvent, TranscriptListener, TranscriptionResult};
pub use error::{VoiceError, VoiceResult};
pub use provider::{SpeechProvider, Transcript};
pub use service::{PipelineStats, VoiceTranscriptionService};

/// Initialize structured logging for binaries embedding the pipeline.
///
/// Respects `RUST_LOG`, defaulting to info-level output for this crate.
/// Call once at process start; calling twice returns an error from the
/// subscriber registry.
pub fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,interview_voice_core=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    Ok(())
}
