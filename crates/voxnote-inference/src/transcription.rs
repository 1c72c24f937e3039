//! Server-side re-transcription of recorded audio.
//!
//! The device transcript is what the user saw while dictating. When the
//! recording is uploaded, a Whisper-compatible server may produce a better
//! one; the ingestion pipeline prefers it when it is non-empty.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use voxnote_core::defaults;
use voxnote_core::{Error, Result};

/// Text recovered from a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionResult {
    /// Trimmed transcript.
    pub text: String,
    /// Language the server detected, when it reports one.
    pub language: Option<String>,
    pub duration_secs: Option<f64>,
}

impl TranscriptionResult {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe a recording. `locale` is the dictation locale of the entry
    /// (for example `en-US`) and is only a hint.
    async fn transcribe(
        &self,
        audio: &[u8],
        mime_type: &str,
        locale: Option<&str>,
    ) -> Result<TranscriptionResult>;

    fn model_name(&self) -> &str;
}

/// Whisper language hint for a dictation locale.
///
/// Whisper takes bare ISO 639-1 codes, so `en-US` and `pt_BR` become `en`
/// and `pt`. Anything that does not start with a two or three letter code
/// yields no hint and lets the server detect the language.
pub fn language_hint(locale: &str) -> Option<String> {
    let primary = locale.trim().split(['-', '_']).next()?;
    let valid = (2..=3).contains(&primary.len()) && primary.chars().all(|c| c.is_ascii_alphabetic());
    valid.then(|| primary.to_ascii_lowercase())
}

/// Connection settings for a Whisper-compatible server.
///
/// | Variable | Default |
/// |----------|---------|
/// | `WHISPER_BASE_URL` | unset, which disables re-transcription |
/// | `WHISPER_MODEL` | `whisper-1` |
/// | `WHISPER_TIMEOUT_SECS` | 60 |
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl WhisperConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: defaults::DEFAULT_WHISPER_MODEL.to_string(),
            timeout: Duration::from_secs(defaults::TRANSCRIBE_TIMEOUT_SECS),
        }
    }

    /// `None` when `WHISPER_BASE_URL` is unset or empty.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var(defaults::ENV_WHISPER_BASE_URL)
            .ok()
            .filter(|u| !u.trim().is_empty())?;
        let mut config = Self::new(base_url);
        if let Ok(model) = std::env::var(defaults::ENV_WHISPER_MODEL) {
            config.model = model;
        }
        if let Some(secs) = std::env::var("WHISPER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        Some(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Client for the OpenAI-style `/v1/audio/transcriptions` endpoint.
pub struct WhisperBackend {
    client: reqwest::Client,
    config: WhisperConfig,
}

impl WhisperBackend {
    pub fn new(config: WhisperConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> Option<Self> {
        WhisperConfig::from_env().map(Self::new)
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

fn file_name_for(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/mpeg" | "audio/mp3" => "recording.mp3",
        "audio/ogg" => "recording.ogg",
        "audio/flac" => "recording.flac",
        "audio/aac" => "recording.aac",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "recording.m4a",
        "audio/webm" => "recording.webm",
        _ => "recording.wav",
    }
}

#[derive(Deserialize)]
struct WhisperReply {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

#[async_trait]
impl TranscriptionBackend for WhisperBackend {
    async fn transcribe(
        &self,
        audio: &[u8],
        mime_type: &str,
        locale: Option<&str>,
    ) -> Result<TranscriptionResult> {
        let start = Instant::now();
        let url = format!(
            "{}/v1/audio/transcriptions",
            self.config.base_url.trim_end_matches('/')
        );

        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(file_name_for(mime_type))
            .mime_str(mime_type)
            .map_err(|e| Error::InvalidInput(format!("Unsupported audio type {}: {}", mime_type, e)))?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json");
        if let Some(language) = locale.and_then(language_hint) {
            form = form.text("language", language);
        }

        let timeout = self.config.timeout;
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("transcription after {}s", timeout.as_secs()))
                } else {
                    Error::Transcription(format!("Whisper unreachable: {}", e))
                }
            })?;

        let status = response.status();
        if status == StatusCode::GATEWAY_TIMEOUT || status == StatusCode::REQUEST_TIMEOUT {
            return Err(Error::Timeout(format!("transcription ({})", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transcription(format!("Whisper returned {}: {}", status, body)));
        }

        let reply: WhisperReply = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("Unreadable Whisper reply: {}", e)))?;

        debug!(
            subsystem = "inference",
            component = "whisper",
            op = "transcribe",
            model = %self.config.model,
            bytes = audio.len(),
            transcript_len = reply.text.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Transcription complete"
        );

        Ok(TranscriptionResult {
            text: reply.text.trim().to_string(),
            language: reply.language,
            duration_secs: reply.duration,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
