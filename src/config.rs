//! # Configuration Management
//!
//! Loads and validates pipeline configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (VOICE_ prefix, `__` between nesting levels)
//! - Default values (built into the code)
//!
//! All configuration is read once when the service is constructed and is
//! treated as read-only for the life of the service instance; there is no
//! hot reload.
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (VOICE_PIPELINE__WORKER_COUNT, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Top-level pipeline configuration.
///
/// Broken into logical groups: audio format expectations, batching/queueing
/// behavior, and STT backend selection with per-backend credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub audio: AudioSettings,
    pub pipeline: PipelineSettings,
    pub provider: ProviderSettings,
}

/// Expected audio format for incoming chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Sample rate of incoming PCM (16000 is what every backend expects)
    pub sample_rate: u32,

    /// Channel count (1 = mono)
    pub channels: u8,

    /// Advisory chunk size in bytes for the connection layer; not enforced
    pub chunk_size_hint: usize,
}

/// Batching, queueing, and dispatch tuning.
///
/// ## Tuning guidelines:
/// - Lower `flush_interval_ms` / `chunk_threshold`: lower caption latency,
///   more backend calls
/// - Higher `queue_capacity`: absorbs bursts, more memory
/// - Higher `worker_count`: more concurrent backend calls, but flushes for
///   one session may then complete out of order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Flush a session's audio when this much time has passed since its
    /// last flush (milliseconds)
    pub flush_interval_ms: u64,

    /// Flush a session's audio once this many chunks have arrived since its
    /// last flush
    pub chunk_threshold: u32,

    /// Maximum queued transcription tasks; tasks beyond this are dropped
    pub queue_capacity: usize,

    /// Number of transcription workers consuming the queue
    pub worker_count: usize,

    /// Results below this confidence never reach a listener (0.0 to 1.0)
    pub confidence_threshold: f32,

    /// Maximum buffered chunks across all sessions; the single oldest chunk
    /// is evicted when the cap is exceeded
    pub buffer_max_chunks: usize,

    /// How long `stop()` waits for workers to finish before detaching
    /// (milliseconds)
    pub shutdown_grace_ms: u64,
}

/// STT backend selection and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Which backend to use: "cloud", "local", or "vendor"
    pub backend: String,

    /// Target language (ISO 639-1 code like "en", "es", "fr")
    pub language: String,

    pub cloud: CloudSettings,
    pub vendor: VendorSettings,
    pub local: LocalSettings,
}

/// Hosted recognition API (OpenAI-compatible transcription endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSettings {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// Per-request timeout (milliseconds)
    pub request_timeout_ms: u64,
}

/// Vendor REST API requiring a token request before each recognize call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorSettings {
    pub token_url: String,
    pub recognize_url: String,
    pub app_id: String,
    pub app_secret: String,
    /// Per-request timeout (milliseconds)
    pub request_timeout_ms: u64,
}

/// Locally-run Whisper model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSettings {
    /// Model size: "tiny", "base", "small", "medium", "large"
    pub model_size: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            audio: AudioSettings {
                sample_rate: 16000,
                channels: 1,
                chunk_size_hint: 3200, // 100ms of 16kHz 16-bit mono
            },
            pipeline: PipelineSettings {
                flush_interval_ms: 2000,
                chunk_threshold: 3,
                queue_capacity: 64,
                worker_count: 1,
                confidence_threshold: 0.7,
                buffer_max_chunks: 256,
                shutdown_grace_ms: 5000,
            },
            provider: ProviderSettings {
                backend: "cloud".to_string(),
                language: "en".to_string(),
                cloud: CloudSettings {
                    endpoint: "https://api.openai.com/v1/audio/transcriptions".to_string(),
                    api_key: String::new(),
                    model: "whisper-1".to_string(),
                    request_timeout_ms: 15000,
                },
                vendor: VendorSettings {
                    token_url: String::new(),
                    recognize_url: String::new(),
                    app_id: String::new(),
                    app_secret: String::new(),
                    request_timeout_ms: 15000,
                },
                local: LocalSettings {
                    model_size: "base".to_string(),
                },
            },
        }
    }
}

impl VoiceConfig {
    /// Load configuration from defaults, config.toml, and the environment.
    ///
    /// Environment variables use a double underscore between nesting
    /// levels, since field names themselves contain underscores.
    ///
    /// ## Environment Variable Examples:
    /// - `VOICE_PROVIDER__BACKEND=local`
    /// - `VOICE_PIPELINE__WORKER_COUNT=4`
    /// - `VOICE_PROVIDER__CLOUD__API_KEY=sk-...`
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&VoiceConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("VOICE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching configuration defects here means the service refuses to
    /// construct rather than failing mid-stream once audio is flowing.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Sample rate cannot be 0"));
        }

        if self.audio.channels != 1 {
            return Err(anyhow::anyhow!(
                "Only mono audio is supported (got {} channels)",
                self.audio.channels
            ));
        }

        if self.pipeline.chunk_threshold == 0 {
            return Err(anyhow::anyhow!("Chunk threshold must be greater than 0"));
        }

        if self.pipeline.queue_capacity == 0 {
            return Err(anyhow::anyhow!("Queue capacity must be greater than 0"));
        }

        if self.pipeline.worker_count == 0 {
            return Err(anyhow::anyhow!("Worker count must be greater than 0"));
        }

        if self.pipeline.buffer_max_chunks == 0 {
            return Err(anyhow::anyhow!("Buffer capacity must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.pipeline.confidence_threshold) {
            return Err(anyhow::anyhow!(
                "Confidence threshold must be between 0.0 and 1.0 (got {})",
                self.pipeline.confidence_threshold
            ));
        }

        match self.provider.backend.as_str() {
            "cloud" | "local" | "vendor" => {}
            other => {
                return Err(anyhow::anyhow!("Unknown STT backend: '{}'", other));
            }
        }

        Ok(())
    }
}
