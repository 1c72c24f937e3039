//! OpenAI-compatible inference backend implementation.

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use voxnote_core::defaults;
use voxnote_core::{EmbeddingBackend, Error, GenerationBackend, Result};

use super::error::{from_transport, to_voxnote_error, CallKind, OpenAIErrorCode};
use super::types::*;

/// Configuration for OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication (optional for local endpoints).
    pub api_key: Option<String>,
    /// Model to use for embeddings.
    pub embed_model: String,
    /// Model to use for classification and titles.
    pub gen_model: String,
    /// Expected embedding dimension.
    pub embed_dimension: usize,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Skip TLS verification (for self-signed certs in local environments).
    pub skip_tls_verify: bool,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OPENAI_URL.to_string(),
            api_key: None,
            embed_model: defaults::EMBED_MODEL.to_string(),
            gen_model: defaults::GEN_MODEL.to_string(),
            embed_dimension: defaults::EMBED_DIMENSION,
            timeout_seconds: defaults::OPENAI_TIMEOUT_SECS,
            skip_tls_verify: false,
        }
    }
}

impl OpenAIConfig {
    /// Load configuration from environment variables with fallback to defaults.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            base_url: std::env::var(defaults::ENV_OPENAI_BASE_URL).unwrap_or(base.base_url),
            api_key: std::env::var(defaults::ENV_OPENAI_API_KEY)
                .ok()
                .filter(|k| !k.is_empty()),
            embed_model: std::env::var(defaults::ENV_OPENAI_EMBED_MODEL)
                .unwrap_or(base.embed_model),
            gen_model: std::env::var(defaults::ENV_OPENAI_GEN_MODEL).unwrap_or(base.gen_model),
            embed_dimension: std::env::var(defaults::ENV_OPENAI_EMBED_DIM)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(base.embed_dimension),
            timeout_seconds: std::env::var(defaults::ENV_OPENAI_TIMEOUT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(base.timeout_seconds),
            skip_tls_verify: std::env::var("OPENAI_SKIP_TLS_VERIFY")
                .map(|v| v == "1" || v.to_lowercase() == "true")
                .unwrap_or(false),
        }
    }
}

/// OpenAI-compatible inference backend.
///
/// Serves both embeddings and chat generation; the classifier wraps it
/// through [`GenerationBackend`].
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    /// Create a new OpenAI backend with the given configuration.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let mut client_builder =
            Client::builder().timeout(Duration::from_secs(config.timeout_seconds));

        if config.skip_tls_verify {
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        let client = client_builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            url = %config.base_url,
            embed_model = %config.embed_model,
            gen_model = %config.gen_model,
            "Initializing OpenAI backend"
        );

        Ok(Self { client, config })
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(OpenAIConfig::default())
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env())
    }

    /// Get the current configuration.
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// Build a request with authentication if configured.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req.header("Content-Type", "application/json")
    }

    async fn error_from_response(kind: CallKind, response: reqwest::Response) -> Error {
        let status = response.status();
        let body: OpenAIErrorResponse = response
            .json()
            .await
            .unwrap_or_else(|_| OpenAIErrorResponse::unknown());
        let code = OpenAIErrorCode::from_response(status.as_u16(), &body.error.error_type);
        to_voxnote_error(
            kind,
            code,
            &format!("OpenAI returned {}: {}", status, body.error.message),
        )
    }

    async fn chat(&self, system: &str, prompt: &str, json_mode: bool) -> Result<String> {
        let start = Instant::now();
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));

        let request = ChatCompletionRequest {
            model: self.config.gen_model.clone(),
            messages,
            temperature: Some(0.0),
            response_format: json_mode.then(ResponseFormat::json_object),
        };

        let response = self
            .build_request("/chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(|e| from_transport(CallKind::Generation, e))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(CallKind::Generation, response).await);
        }

        let result: ChatCompletionResponse = response.json().await.map_err(|e| {
            Error::Classification(format!("Failed to parse response: {}", e))
        })?;

        let content = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        debug!(
            subsystem = "inference",
            component = "openai",
            op = "chat",
            model = %self.config.gen_model,
            prompt_len = prompt.len(),
            response_len = content.len(),
            json_mode,
            duration_ms = start.elapsed().as_millis() as u64,
            "Generation complete"
        );
        Ok(content)
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAIBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let start = Instant::now();
        let request = EmbeddingRequest {
            model: self.config.embed_model.clone(),
            input: texts.to_vec(),
            encoding_format: Some("float".to_string()),
        };

        let response = self
            .build_request("/embeddings")
            .json(&request)
            .send()
            .await
            .map_err(|e| from_transport(CallKind::Embedding, e))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(CallKind::Embedding, response).await);
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        // Sort by index to ensure correct ordering
        let mut data = result.data;
        data.sort_by_key(|d| d.index);

        if data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }

        let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();

        debug!(
            subsystem = "inference",
            component = "openai",
            op = "embed_texts",
            model = %self.config.embed_model,
            input_count = texts.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Generated embeddings"
        );
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

#[async_trait]
impl GenerationBackend for OpenAIBackend {
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.chat(system, prompt, false).await
    }

    async fn generate_json(&self, system: &str, prompt: &str) -> Result<String> {
        self.chat(system, prompt, true).await
    }

    fn model_name(&self) -> &str {
        &self.config.gen_model
    }
}
