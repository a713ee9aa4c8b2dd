//! # Local Whisper Provider
//!
//! On-device backend: no network call per transcription. The model is
//! loaded lazily on the first `transcribe` call, so that call pays the
//! download/load latency; later calls reuse the loaded model behind a
//! read-write lock.
//!
//! Greedy Whisper decoding produces no usable confidence score, so a fixed
//! high confidence is assigned, mirroring the cloud backend's contract.

use crate::config::LocalSettings;
use crate::provider::whisper::{select_device, ModelSize, WhisperModel};
use crate::provider::{SpeechProvider, Transcript};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Confidence assigned to successful results; greedy decoding reports none.
const ASSIGNED_CONFIDENCE: f32 = 0.9;

/// Locally-run Whisper backend with lazy model loading.
pub struct LocalWhisperProvider {
    model: RwLock<Option<WhisperModel>>,
    settings: LocalSettings,
    language: String,
}

impl LocalWhisperProvider {
    pub fn new(settings: LocalSettings, language: String) -> Self {
        Self {
            model: RwLock::new(None),
            settings,
            language,
        }
    }

    /// Load the configured model if it is not resident yet.
    async fn ensure_loaded(&self) -> Result<()> {
        if self.model.read().await.is_some() {
            return Ok(());
        }

        let mut guard = self.model.write().await;
        // Another caller may have loaded while we waited on the write lock
        if guard.is_some() {
            return Ok(());
        }

        let size: ModelSize = self.settings.model_size.parse()?;
        let loaded = WhisperModel::load(size, select_device()).await?;
        *guard = Some(loaded);
        Ok(())
    }

    async fn try_transcribe(&self, audio: &[u8]) -> Result<Transcript> {
        if audio.is_empty() {
            return Err(anyhow!("no audio to transcribe"));
        }

        self.ensure_loaded().await?;

        let samples = super::pcm_to_samples(audio);
        let floats = super::samples_to_float(&samples);

        let mut guard = self.model.write().await;
        let model = guard
            .as_mut()
            .ok_or_else(|| anyhow!("model unloaded during transcription"))?;
        let text = model.transcribe(&floats, Some(&self.language))?;

        Ok(Transcript {
            text,
            confidence: ASSIGNED_CONFIDENCE,
            language: self.language.clone(),
        })
    }
}

#[async_trait]
impl SpeechProvider for LocalWhisperProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn transcribe(&self, audio: &[u8]) -> Transcript {
        match self.try_transcribe(audio).await {
            Ok(transcript) => transcript,
            Err(err) => {
                tracing::warn!("Local transcription failed: {}", err);
                Transcript::empty(&self.language)
            }
        }
    }
}
