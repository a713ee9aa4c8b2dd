//! # Whisper Model Internals
//!
//! Candle-based Whisper model loading and greedy decoding for the local
//! backend. Model weights and tokenizer are fetched from HuggingFace on
//! first load and cached by hf-hub; only safetensors weights are supported.

use anyhow::{anyhow, Result};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use tokenizers::Tokenizer;

/// Available model sizes.
///
/// Larger models are more accurate and slower; `base` is the default
/// balance for real-time captioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// HuggingFace repository holding this model's weights.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// Pick the best available inference device: CUDA, then Metal, then CPU.
pub fn select_device() -> Device {
    if let Ok(device) = Device::new_cuda(0) {
        tracing::info!("Using CUDA device for local transcription");
        return device;
    }
    if let Ok(device) = Device::new_metal(0) {
        tracing::info!("Using Metal device for local transcription");
        return device;
    }
    tracing::info!("Using CPU for local transcription");
    Device::Cpu
}

/// A loaded Whisper model ready to decode audio.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,
    size: ModelSize,
}

impl WhisperModel {
    /// Download (or reuse the hf-hub cache for) and load the model.
    pub async fn load(size: ModelSize, device: Device) -> Result<Self> {
        tracing::info!("Loading Whisper {} model", size);
        let start = std::time::Instant::now();

        let api = hf_hub::api::tokio::ApiBuilder::new()
            .with_token(std::env::var("HF_TOKEN").ok())
            .with_progress(false)
            .build()
            .map_err(|e| anyhow!("Failed to initialize HuggingFace API: {}", e))?;
        let repo = api.model(size.repo_name().to_string());

        let config_path = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", size.repo_name(), e))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", size.repo_name(), e))?;
        let weights_path = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("Failed to download model weights from {}: {}", size.repo_name(), e))?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_path)?)?;
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        let mel_filters = build_mel_filter_bank(config.num_mel_bins as usize);

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], m::DTYPE, &device)? };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        tracing::info!(
            "Whisper {} model loaded in {:.2}s",
            size,
            start.elapsed().as_secs_f64()
        );

        Ok(Self {
            model,
            config,
            device,
            tokenizer,
            mel_filters,
            size,
        })
    }

    pub fn size(&self) -> ModelSize {
        self.size
    }

    /// Decode normalized f32 samples (16kHz mono) to text with greedy
    /// decoding and a repetition guard.
    pub fn transcribe(&mut self, audio: &[f32], language: Option<&str>) -> Result<String> {
        if audio.is_empty() {
            return Err(anyhow!("Audio data is empty"));
        }

        let mel = self.audio_to_mel(audio)?;
        let mel = mel.unsqueeze(0)?;
        let encoder_output = self.model.encoder.forward(&mel, false)?;

        let mut tokens = vec![self.special_token("<|startoftranscript|>", 50258)];
        if let Some(lang) = language {
            let marker = format!("<|{}|>", lang.to_lowercase());
            if let Some(id) = self.tokenizer.token_to_id(&marker) {
                tokens.push(id);
            }
        }
        tokens.push(self.special_token("<|transcribe|>", 50359));
        tokens.push(self.special_token("<|notimestamps|>", 50363));

        let eot = self.special_token("<|endoftext|>", 50257);
        let mut output_tokens = Vec::new();

        const MAX_TOKENS: usize = 224;
        for _ in 0..MAX_TOKENS {
            let token_tensor = Tensor::new(&tokens[..], &self.device)?.unsqueeze(0)?;
            let logits = self
                .model
                .decoder
                .forward(&token_tensor, &encoder_output, false)?;
            let last_logits = logits.i((.., tokens.len() - 1, ..))?;
            let next_token = last_logits.argmax_keepdim(1)?.to_scalar::<u32>()?;

            if next_token == eot {
                break;
            }
            if is_repetitive(&output_tokens, next_token) {
                break;
            }

            tokens.push(next_token);
            output_tokens.push(next_token);
        }

        self.decode_tokens(&output_tokens)
    }

    /// Look up a special token id, falling back to the standard Whisper
    /// vocabulary position when the tokenizer file omits it.
    fn special_token(&self, marker: &str, fallback: u32) -> u32 {
        self.tokenizer.token_to_id(marker).unwrap_or(fallback)
    }

    /// Convert samples into the log-mel spectrogram tensor the encoder
    /// expects: audio is padded or truncated to the model's 30s window.
    fn audio_to_mel(&self, audio: &[f32]) -> Result<Tensor> {
        let target_len = 30 * m::SAMPLE_RATE;
        let mut padded = vec![0.0f32; target_len];
        let copy_len = audio.len().min(target_len);
        padded[..copy_len].copy_from_slice(&audio[..copy_len]);

        let n_mels = self.config.num_mel_bins as usize;
        let mel = m::audio::pcm_to_mel(&self.config, &padded, &self.mel_filters);
        let n_frames = mel.len() / n_mels;
        Ok(Tensor::from_vec(mel, (n_mels, n_frames), &self.device)?)
    }

    fn decode_tokens(&self, tokens: &[u32]) -> Result<String> {
        let text = self
            .tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        // Strip marker artifacts the tokenizer occasionally leaks through
        let cleaned = text
            .replace("<|startoftranscript|>", "")
            .replace("<|endoftext|>", "")
            .replace("<|notimestamps|>", "");

        Ok(cleaned.trim().to_string())
    }
}

/// Triangular mel filter bank for the model's configured bin count.
fn build_mel_filter_bank(n_mels: usize) -> Vec<f32> {
    let n_fft = m::N_FFT;
    let n_bins = n_fft / 2 + 1;
    let mut filters = vec![0.0f32; n_bins * n_mels];

    for mel in 0..n_mels {
        let center = (mel + 1) * n_bins / (n_mels + 1);
        let width = (n_bins / (n_mels + 1)).max(1);

        for bin in center.saturating_sub(width)..(center + width).min(n_bins) {
            let distance = (bin as i32 - center as i32).abs() as f32;
            filters[mel * n_bins + bin] = (1.0 - distance / width as f32).max(0.0);
        }
    }

    filters
}

/// Detect immediate or short-pattern token repetition, the characteristic
/// failure mode of greedy Whisper decoding on noisy audio.
fn is_repetitive(tokens: &[u32], new_token: u32) -> bool {
    let n = tokens.len();
    if n >= 2 && tokens[n - 1] == new_token && tokens[n - 2] == new_token {
        return true;
    }
    if n >= 6 && tokens[n - 3..] == tokens[n - 6..n - 3] {
        return true;
    }
    false
}
