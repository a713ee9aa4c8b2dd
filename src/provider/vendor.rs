//! # Vendor REST Provider
//!
//! Adapter for a vendor speech API that requires a two-step call sequence:
//! first exchange the app credentials for a short-lived access token, then
//! POST the audio to the recognize endpoint with that token attached.
//!
//! Tokens are cached until shortly before expiry so steady-state traffic
//! pays one HTTP call per flush, not two. Unlike the cloud backend, this
//! vendor reports a native confidence score, which is passed through
//! unchanged. All failures degrade to an empty zero-confidence transcript.

use crate::config::VendorSettings;
use crate::provider::{SpeechProvider, Transcript};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;

/// Refresh the token this long before its reported expiry.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Two-step token-then-recognize vendor adapter.
pub struct VendorRestProvider {
    client: reqwest::Client,
    settings: VendorSettings,
    language: String,
    sample_rate: u32,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Token lifetime in seconds
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    text: String,
    confidence: f32,
}

impl VendorRestProvider {
    pub fn new(settings: VendorSettings, language: String, sample_rate: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .unwrap_or_default();

        Self {
            client,
            settings,
            language,
            sample_rate,
            token: Mutex::new(None),
        }
    }

    /// Return a valid access token, requesting a fresh one if the cached
    /// token is missing or close to expiry.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            let margin = ChronoDuration::seconds(TOKEN_EXPIRY_MARGIN_SECS);
            if token.expires_at > Utc::now() + margin {
                return Ok(token.token.clone());
            }
        }

        let response = self
            .client
            .post(&self.settings.token_url)
            .json(&json!({
                "app_id": self.settings.app_id,
                "app_secret": self.settings.app_secret,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("token endpoint returned {}", status));
        }

        let body: TokenResponse = response.json().await?;
        let fresh = CachedToken {
            token: body.access_token.clone(),
            expires_at: Utc::now() + ChronoDuration::seconds(body.expires_in),
        };
        *cached = Some(fresh);

        tracing::debug!("Refreshed vendor access token (ttl {}s)", body.expires_in);
        Ok(body.access_token)
    }

    async fn try_transcribe(&self, audio: &[u8]) -> Result<Transcript> {
        if audio.is_empty() {
            return Err(anyhow!("no audio to transcribe"));
        }

        let token = self.access_token().await?;
        let wav_bytes = super::pcm_to_wav(audio, self.sample_rate)?;

        let response = self
            .client
            .post(&self.settings.recognize_url)
            .header("X-Access-Token", token)
            .query(&[
                ("language", self.language.as_str()),
                ("format", "wav"),
            ])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(wav_bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // A stale token is the common failure; clear the cache so the
            // next attempt re-authenticates.
            if status == reqwest::StatusCode::UNAUTHORIZED {
                *self.token.lock().await = None;
            }
            return Err(anyhow!("recognize endpoint returned {}", status));
        }

        let body: RecognizeResponse = response.json().await?;

        Ok(Transcript {
            text: body.text.trim().to_string(),
            confidence: body.confidence.clamp(0.0, 1.0),
            language: self.language.clone(),
        })
    }
}

#[async_trait]
impl SpeechProvider for VendorRestProvider {
    fn name(&self) -> &str {
        "vendor"
    }

    async fn transcribe(&self, audio: &[u8]) -> Transcript {
        match self.try_transcribe(audio).await {
            Ok(transcript) => transcript,
            Err(err) => {
                tracing::warn!("Vendor transcription failed: {}", err);
                Transcript::empty(&self.language)
            }
        }
    }
}
