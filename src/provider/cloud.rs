//! # Cloud Recognition Provider
//!
//! Adapter for a hosted speech recognition service exposing an
//! OpenAI-compatible `/audio/transcriptions` endpoint. Audio is wrapped in
//! a WAV container and uploaded as a multipart form; the response is a JSON
//! body carrying the transcribed text.
//!
//! The service returns no native confidence score, so the adapter assigns
//! a fixed high confidence to every successful transcription. Failures of
//! any kind degrade to an empty zero-confidence transcript.

use crate::config::CloudSettings;
use crate::provider::{SpeechProvider, Transcript};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Confidence assigned to successful results; the hosted API reports none.
const ASSIGNED_CONFIDENCE: f32 = 0.9;

/// Hosted recognition API adapter.
pub struct CloudSpeechProvider {
    client: reqwest::Client,
    settings: CloudSettings,
    language: String,
    sample_rate: u32,
}

/// JSON body of a successful transcription response.
#[derive(Debug, Deserialize)]
struct CloudResponse {
    text: String,
}

impl CloudSpeechProvider {
    pub fn new(settings: CloudSettings, language: String, sample_rate: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .unwrap_or_default();

        Self {
            client,
            settings,
            language,
            sample_rate,
        }
    }

    async fn try_transcribe(&self, audio: &[u8]) -> Result<Transcript> {
        if audio.is_empty() {
            return Err(anyhow!("no audio to transcribe"));
        }

        let wav_bytes = super::pcm_to_wav(audio, self.sample_rate)?;

        let part = reqwest::multipart::Part::bytes(wav_bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.settings.model.clone())
            .text("language", self.language.clone())
            .text("response_format", "json");

        let response = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(&self.settings.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("recognition endpoint returned {}", status));
        }

        let body: CloudResponse = response.json().await?;

        Ok(Transcript {
            text: body.text.trim().to_string(),
            confidence: ASSIGNED_CONFIDENCE,
            language: self.language.clone(),
        })
    }
}

#[async_trait]
impl SpeechProvider for CloudSpeechProvider {
    fn name(&self) -> &str {
        "cloud"
    }

    async fn transcribe(&self, audio: &[u8]) -> Transcript {
        match self.try_transcribe(audio).await {
            Ok(transcript) => transcript,
            Err(err) => {
                tracing::warn!("Cloud transcription failed: {}", err);
                Transcript::empty(&self.language)
            }
        }
    }
}
