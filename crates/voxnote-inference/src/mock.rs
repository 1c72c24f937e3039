//! Mock inference backends for deterministic testing.
//!
//! Enabled for this crate's own tests and, through the `mock` feature, for
//! downstream crates that need a classifier, an embedder, and a transcriber
//! without a network.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use voxnote_inference::mock::{MockClassifier, MockEmbedder};
//!
//! let embedder = MockEmbedder::new().with_dimension(64);
//! let classifier = MockClassifier::new().with_category("Travel");
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::transcription::{TranscriptionBackend, TranscriptionResult};
use voxnote_core::{
    ClassificationResult, ClassifierBackend, ClassifyRequest, EmbeddingBackend, Error,
    GenerationBackend, Result,
};

/// Mock embedding generator with deterministic output.
pub struct MockEmbeddingGenerator;

impl MockEmbeddingGenerator {
    /// Generate a deterministic embedding from text.
    ///
    /// Uses character-based hashing for reproducibility. The same text
    /// will always produce the same embedding.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0; dimension];
        if dimension == 0 {
            return vec;
        }

        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }

        Self::normalize(&mut vec);
        vec
    }

    /// Generate embedding from seed (for random-like but deterministic vectors).
    pub fn generate_with_seed(seed: u64, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0; dimension];
        let mut state = seed;

        // Simple LCG for deterministic pseudo-random values
        for item in vec.iter_mut() {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            *item = ((state % 1000) as f32) / 1000.0 - 0.5;
        }

        Self::normalize(&mut vec);
        vec
    }

    /// Unit vector along `axis`; handy for exact similarity arithmetic.
    pub fn axis(axis: usize, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0; dimension];
        if let Some(v) = vec.get_mut(axis) {
            *v = 1.0;
        }
        vec
    }

    fn normalize(vec: &mut [f32]) {
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
    }
}

#[derive(Default)]
struct Behaviour {
    latency_ms: u64,
    failure_rate: f64,
}

impl Behaviour {
    fn should_fail(&self) -> bool {
        use rand::Rng;
        self.failure_rate > 0.0 && rand::thread_rng().gen::<f64>() < self.failure_rate
    }

    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;
        }
    }
}

// =============================================================================
// EMBEDDER
// =============================================================================

/// Deterministic embedding backend.
///
/// Texts registered with [`MockEmbedder::with_vector`] return that exact
/// vector; everything else goes through [`MockEmbeddingGenerator`].
#[derive(Clone)]
pub struct MockEmbedder {
    dimension: usize,
    fixed: Arc<HashMap<String, Vec<f32>>>,
    behaviour: Arc<Behaviour>,
    calls: Arc<AtomicUsize>,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: 64,
            fixed: Arc::new(HashMap::new()),
            behaviour: Arc::new(Behaviour::default()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Return `vector` whenever `text` is embedded.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        Arc::make_mut(&mut self.fixed).insert(text.into(), vector);
        self
    }

    /// Set simulated latency for every call.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.behaviour = Arc::new(Behaviour {
            latency_ms,
            failure_rate: self.behaviour.failure_rate,
        });
        self
    }

    /// Set failure rate (0.0 - 1.0) for testing error handling.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.behaviour = Arc::new(Behaviour {
            latency_ms: self.behaviour.latency_ms,
            failure_rate: rate.clamp(0.0, 1.0),
        });
        self
    }

    /// Number of `embed_texts` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.behaviour.simulate_latency().await;
        if self.behaviour.should_fail() {
            return Err(Error::Embedding("Simulated failure".to_string()));
        }

        Ok(texts
            .iter()
            .map(|t| {
                self.fixed
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| MockEmbeddingGenerator::generate(t, self.dimension))
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

// =============================================================================
// CLASSIFIER
// =============================================================================

/// Scripted classifier.
///
/// Transcripts containing a registered keyword get that keyword's result;
/// anything else gets the default result with `cleaned_transcript` set to
/// the input.
#[derive(Clone)]
pub struct MockClassifier {
    default: ClassificationResult,
    by_keyword: Arc<Vec<(String, ClassificationResult)>>,
    title: Option<String>,
    behaviour: Arc<Behaviour>,
    requests: Arc<Mutex<Vec<ClassifyRequest>>>,
    title_calls: Arc<AtomicUsize>,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self {
            default: Self::result("General"),
            by_keyword: Arc::new(Vec::new()),
            title: None,
            behaviour: Arc::new(Behaviour::default()),
            requests: Arc::new(Mutex::new(Vec::new())),
            title_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build a plain, non-explicit result for `category_name`.
    pub fn result(category_name: &str) -> ClassificationResult {
        ClassificationResult {
            cleaned_transcript: String::new(),
            title: format!("{} note", category_name),
            category_name: category_name.to_string(),
            is_explicit_placement: false,
            confidence: 0.9,
            suggested_new_category: None,
        }
    }

    /// Classify everything into `category_name` by default.
    pub fn with_category(mut self, category_name: &str) -> Self {
        self.default = Self::result(category_name);
        self
    }

    /// Replace the default result.
    pub fn with_default(mut self, result: ClassificationResult) -> Self {
        self.default = result;
        self
    }

    /// Use `result` for transcripts containing `keyword`.
    pub fn with_keyword(mut self, keyword: impl Into<String>, result: ClassificationResult) -> Self {
        Arc::make_mut(&mut self.by_keyword).push((keyword.into(), result));
        self
    }

    /// Fixed title for the manual path.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.behaviour = Arc::new(Behaviour {
            latency_ms,
            failure_rate: self.behaviour.failure_rate,
        });
        self
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.behaviour = Arc::new(Behaviour {
            latency_ms: self.behaviour.latency_ms,
            failure_rate: rate.clamp(0.0, 1.0),
        });
        self
    }

    /// Every classify request received so far.
    pub fn requests(&self) -> Vec<ClassifyRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn classify_call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn title_call_count(&self) -> usize {
        self.title_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClassifierBackend for MockClassifier {
    async fn classify(&self, req: &ClassifyRequest) -> Result<ClassificationResult> {
        self.requests.lock().unwrap().push(req.clone());
        self.behaviour.simulate_latency().await;
        if self.behaviour.should_fail() {
            return Err(Error::Classification("Simulated failure".to_string()));
        }

        let mut result = self
            .by_keyword
            .iter()
            .find(|(k, _)| req.transcript.contains(k.as_str()))
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| self.default.clone());
        if result.cleaned_transcript.is_empty() {
            result.cleaned_transcript = req.transcript.trim().to_string();
        }
        Ok(result)
    }

    async fn generate_title(&self, transcript: &str, _locale: &str) -> Result<String> {
        self.title_calls.fetch_add(1, Ordering::SeqCst);
        self.behaviour.simulate_latency().await;
        if self.behaviour.should_fail() {
            return Err(Error::Classification("Simulated failure".to_string()));
        }
        Ok(self
            .title
            .clone()
            .unwrap_or_else(|| crate::classifier::fallback_title(transcript)))
    }

    fn model_name(&self) -> &str {
        "mock-classifier"
    }
}

// =============================================================================
// GENERATOR
// =============================================================================

/// Generation backend returning a fixed reply.
#[derive(Clone)]
pub struct MockGenerator {
    reply: String,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// User prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for MockGenerator {
    async fn generate_with_system(&self, _system: &str, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "mock-gen"
    }
}

// =============================================================================
// TRANSCRIBER
// =============================================================================

/// Transcriber returning fixed text, or failing on demand.
#[derive(Clone)]
pub struct MockTranscriber {
    text: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl MockTranscriber {
    /// Always transcribe to `text`.
    pub fn returning(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always fail with `Error::Transcription`.
    pub fn failing() -> Self {
        Self {
            text: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptionBackend for MockTranscriber {
    async fn transcribe(
        &self,
        _audio_data: &[u8],
        _mime_type: &str,
        locale: Option<&str>,
    ) -> Result<TranscriptionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.text {
            Some(text) => Ok(TranscriptionResult {
                text: text.clone(),
                language: locale.and_then(crate::transcription::language_hint),
                duration_secs: None,
            }),
            None => Err(Error::Transcription("Simulated failure".to_string())),
        }
    }

    fn model_name(&self) -> &str {
        "mock-whisper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxnote_core::cosine_similarity;

    #[tokio::test]
    async fn test_mock_embedder_dimension() {
        let embedder = MockEmbedder::new().with_dimension(128);
        let embedding = embedder.embed_one("test").await.unwrap();
        assert_eq!(embedding.len(), 128);
        assert_eq!(embedder.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_embedder_deterministic() {
        let embedder = MockEmbedder::new();
        let e1 = embedder.embed_one("quantum computing").await.unwrap();
        let e2 = embedder.embed_one("quantum computing").await.unwrap();
        assert_eq!(e1, e2, "Embeddings should be deterministic");
    }

    #[tokio::test]
    async fn test_mock_embedder_fixed_vector() {
        let embedder = MockEmbedder::new()
            .with_dimension(3)
            .with_vector("beach", vec![1.0, 0.0, 0.0]);
        assert_eq!(embedder.embed_one("beach").await.unwrap(), vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_mock_embedder_failure() {
        let embedder = MockEmbedder::new().with_failure_rate(1.0);
        let err = embedder.embed_one("x").await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[tokio::test]
    async fn test_mock_classifier_keyword_routing() {
        let classifier = MockClassifier::new()
            .with_category("Inbox")
            .with_keyword("flight", MockClassifier::result("Travel"));

        let req = ClassifyRequest {
            transcript: "  book a flight ".to_string(),
            categories: vec![],
            locale: "en".to_string(),
        };
        let result = classifier.classify(&req).await.unwrap();
        assert_eq!(result.category_name, "Travel");
        assert_eq!(result.cleaned_transcript, "book a flight");

        let req = ClassifyRequest {
            transcript: "water the plants".to_string(),
            ..req
        };
        assert_eq!(classifier.classify(&req).await.unwrap().category_name, "Inbox");
        assert_eq!(classifier.classify_call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_classifier_latency_is_virtual_time() {
        tokio::time::pause();
        let classifier = MockClassifier::new().with_latency_ms(5_000);
        let req = ClassifyRequest {
            transcript: "x".to_string(),
            categories: vec![],
            locale: "en".to_string(),
        };
        assert!(classifier.classify(&req).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_transcriber() {
        let ok = MockTranscriber::returning("hello there");
        let result = ok.transcribe(b"RIFF", "audio/wav", Some("en")).await.unwrap();
        assert_eq!(result.text, "hello there");

        let failing = MockTranscriber::failing();
        assert!(failing.transcribe(b"RIFF", "audio/wav", None).await.is_err());
        assert_eq!(failing.call_count(), 1);
    }

    #[test]
    fn test_embedding_generator_normalized() {
        let embedding = MockEmbeddingGenerator::generate("test", 128);
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.01, "Should be normalized");
    }

    #[test]
    fn test_embedding_generator_with_seed() {
        let e1 = MockEmbeddingGenerator::generate_with_seed(42, 256);
        let e2 = MockEmbeddingGenerator::generate_with_seed(42, 256);
        let e3 = MockEmbeddingGenerator::generate_with_seed(43, 256);

        assert_eq!(e1, e2, "Same seed should produce same vector");
        assert_ne!(e1, e3, "Different seed should produce different vector");
    }

    #[test]
    fn test_axis_vectors_are_orthogonal() {
        let a = MockEmbeddingGenerator::axis(0, 4);
        let b = MockEmbeddingGenerator::axis(1, 4);
        assert!(cosine_similarity(&a, &b).unwrap().abs() < 1e-6);
    }
}
