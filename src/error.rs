//! # Error Handling
//!
//! Custom error types for the voice transcription pipeline.
//!
//! ## Error Philosophy:
//! Errors here cover construction-time and lifecycle defects only
//! (bad configuration, unknown backend, calling `ingest` on a stopped
//! service). Once the pipeline is running, failure is represented as data:
//! backend outages become zero-confidence empty transcripts inside the
//! provider adapters, queue overload becomes a dropped-task counter, and a
//! missing listener simply discards the result. Nothing in the
//! ingest/flush/dispatch path returns an error.

use std::fmt;

/// Errors surfaced by service construction and lifecycle management.
///
/// ## Error Categories:
/// - **Config**: configuration file / environment / validation problems
/// - **UnsupportedBackend**: the configured backend name matches no provider
/// - **InvalidState**: a lifecycle call that the current state forbids
#[derive(Debug)]
pub enum VoiceError {
    /// Configuration loading or validation failed
    Config(String),

    /// The configured STT backend name is not recognized
    UnsupportedBackend(String),

    /// Operation not allowed in the current service state
    /// (e.g. `ingest` while stopped, `start` while running)
    InvalidState(String),
}

impl fmt::Display for VoiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceError::Config(msg) => write!(f, "Configuration error: {}", msg),
            VoiceError::UnsupportedBackend(name) => {
                write!(f, "Unsupported STT backend: '{}'", name)
            }
            VoiceError::InvalidState(msg) => write!(f, "Invalid service state: {}", msg),
        }
    }
}

impl std::error::Error for VoiceError {}

/// Config loading and validation use `anyhow` internally; their failures
/// surface as configuration errors at the construction boundary.
impl From<anyhow::Error> for VoiceError {
    fn from(err: anyhow::Error) -> Self {
        VoiceError::Config(err.to_string())
    }
}

/// Shorthand for `Result<T, VoiceError>`.
pub type VoiceResult<T> = Result<T, VoiceError>;
