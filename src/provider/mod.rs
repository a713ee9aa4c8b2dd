//! # STT Provider Adapters
//!
//! One uniform `transcribe(audio) -> Transcript` contract over several
//! interchangeable speech-to-text backends:
//!
//! - **cloud**: hosted recognition REST API (network call, no native
//!   confidence; a fixed high confidence is assigned)
//! - **local**: on-device Whisper via Candle (no network; the model loads
//!   lazily, so the first call pays the load latency)
//! - **vendor**: vendor REST API requiring a token request before each
//!   recognize call
//!
//! ## Failure contract:
//! Adapters never raise. Every backend-specific failure (network errors,
//! malformed audio, timeouts, bad responses) is caught inside the adapter
//! and converted into a zero-confidence, empty-text transcript. Callers
//! treat "no usable transcript" uniformly instead of branching on error
//! type.
//!
//! Backend selection is a pure configuration lookup at service
//! construction; switching backends touches no buffer, queue, or
//! dispatcher code.

pub mod cloud;
pub mod local;
pub mod vendor;
pub mod whisper;

use crate::config::ProviderSettings;
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use std::sync::Arc;

pub use cloud::CloudSpeechProvider;
pub use local::LocalWhisperProvider;
pub use vendor::VendorRestProvider;

/// What a backend produces for one batch of audio.
///
/// `confidence` is 0.0 to 1.0; backends without a native score assign a
/// fixed value, and failures always carry 0.0 with empty text.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    pub confidence: f32,
    pub language: String,
}

impl Transcript {
    /// The uniform "no usable transcript" value adapters return on any
    /// backend failure.
    pub fn empty(language: &str) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            language: language.to_string(),
        }
    }
}

/// The uniform backend contract: PCM/WAV bytes in, transcript out.
///
/// Implementations must be infallible at this boundary; see the module
/// docs for the failure contract.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Backend name for logging and result tagging.
    fn name(&self) -> &str;

    /// Transcribe one batch of 16-bit mono PCM audio.
    async fn transcribe(&self, audio: &[u8]) -> Transcript;
}

/// Construct the configured backend.
///
/// Fails fast on an unknown backend name: that is a configuration defect,
/// caught before any audio is accepted.
pub fn build_provider(
    settings: &ProviderSettings,
    sample_rate: u32,
) -> VoiceResult<Arc<dyn SpeechProvider>> {
    match settings.backend.as_str() {
        "cloud" => Ok(Arc::new(CloudSpeechProvider::new(
            settings.cloud.clone(),
            settings.language.clone(),
            sample_rate,
        ))),
        "local" => Ok(Arc::new(LocalWhisperProvider::new(
            settings.local.clone(),
            settings.language.clone(),
        ))),
        "vendor" => Ok(Arc::new(VendorRestProvider::new(
            settings.vendor.clone(),
            settings.language.clone(),
            sample_rate,
        ))),
        other => Err(VoiceError::UnsupportedBackend(other.to_string())),
    }
}

/// Wrap raw 16-bit mono PCM bytes in a WAV container for REST upload.
pub(crate) fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> anyhow::Result<Vec<u8>> {
    let samples = pcm_to_samples(pcm);
    let header = wav::Header::new(wav::WAV_FORMAT_PCM, 1, sample_rate, 16);
    let mut out = Cursor::new(Vec::new());
    wav::write(header, &wav::BitDepth::Sixteen(samples), &mut out)?;
    Ok(out.into_inner())
}

/// Parse little-endian 16-bit PCM bytes into samples. Trailing odd bytes
/// are ignored.
pub(crate) fn pcm_to_samples(pcm: &[u8]) -> Vec<i16> {
    let mut cursor = Cursor::new(pcm);
    let mut samples = Vec::with_capacity(pcm.len() / 2);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample);
    }
    samples
}

/// Convert 16-bit PCM samples to normalized 32-bit floats, the input format
/// of the local speech model.
pub(crate) fn samples_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Test-only provider used by worker and service tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::{SpeechProvider, Transcript};
    use async_trait::async_trait;

    /// Returns a fixed transcript for every call and records each audio
    /// payload it receives; an empty payload is treated as a backend
    /// failure and degrades to an empty transcript, matching the real
    /// adapters' failure contract.
    pub struct MockProvider {
        text: String,
        confidence: f32,
        received: std::sync::Mutex<Vec<Vec<u8>>>,
    }

    impl MockProvider {
        pub fn new(text: &str, confidence: f32) -> Self {
            Self {
                text: text.to_string(),
                confidence,
                received: std::sync::Mutex::new(Vec::new()),
            }
        }

        /// Audio payloads received so far, in call order.
        pub fn received(&self) -> Vec<Vec<u8>> {
            self.received.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SpeechProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn transcribe(&self, audio: &[u8]) -> Transcript {
            self.received.lock().unwrap().push(audio.to_vec());
            if audio.is_empty() {
                return Transcript::empty("en");
            }
            Transcript {
                text: self.text.clone(),
                confidence: self.confidence,
                language: "en".to_string(),
            }
        }
    }
}
