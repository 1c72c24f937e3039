//! Ingestion pipeline.
//!
//! Turns an [`IngestRequest`] into a stored [`Entry`]. Requests that name a
//! target category take the manual path (title + embedding, no
//! classification). Everything else takes the AI path: optional audio
//! re-transcription, classification, embedding of the cleaned transcript,
//! category resolution, insert.
//!
//! Classification and embedding run under explicit timeouts and both finish
//! before anything is written, so a failed external call leaves the store
//! untouched. If the final entry insert fails, the category written for it
//! is removed again and a touched centroid is restored.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use voxnote_core::defaults;
use voxnote_core::{
    AudioStore, CategoryHint, CategoryRepository, ClassifierBackend, ClassifyRequest,
    EmbeddingBackend, Entry, EntryRepository, Error, IngestRequest, NewEntry, Result,
};
use voxnote_inference::classifier::fallback_title;
use voxnote_inference::TranscriptionBackend;

use crate::centroid::CentroidMaintainer;
use crate::resolver::{CategoryResolver, ResolvedCategory};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Maximum non-archived categories per user.
    pub max_categories: usize,
    /// Similarity threshold when the device transcript is used.
    pub text_similarity_threshold: f32,
    /// Similarity threshold when the transcript came from re-transcribed audio.
    pub audio_similarity_threshold: f32,
    /// Deadline for a classify or title call.
    pub classify_timeout: Duration,
    /// Deadline for an embed call.
    pub embed_timeout: Duration,
    /// Transcripts longer than this (in characters) are rejected.
    pub max_transcript_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_categories: defaults::MAX_CATEGORIES,
            text_similarity_threshold: defaults::TEXT_SIMILARITY_THRESHOLD,
            audio_similarity_threshold: defaults::AUDIO_SIMILARITY_THRESHOLD,
            classify_timeout: Duration::from_secs(defaults::CLASSIFY_TIMEOUT_SECS),
            embed_timeout: Duration::from_secs(defaults::EMBED_TIMEOUT_SECS),
            max_transcript_chars: defaults::MAX_TRANSCRIPT_CHARS,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl IngestConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `VOXNOTE_MAX_CATEGORIES` | `10` | Category cap per user |
    /// | `VOXNOTE_TEXT_SIMILARITY_THRESHOLD` | `0.60` | Threshold for device transcripts |
    /// | `VOXNOTE_AUDIO_SIMILARITY_THRESHOLD` | `0.55` | Threshold for re-transcribed audio |
    /// | `VOXNOTE_CLASSIFY_TIMEOUT_SECS` | `20` | Classify/title deadline |
    /// | `VOXNOTE_EMBED_TIMEOUT_SECS` | `10` | Embed deadline |
    /// | `VOXNOTE_MAX_TRANSCRIPT_CHARS` | `10000` | Transcript length ceiling |
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            max_categories: env_parse::<usize>("VOXNOTE_MAX_CATEGORIES")
                .unwrap_or(base.max_categories)
                .max(1),
            text_similarity_threshold: env_parse("VOXNOTE_TEXT_SIMILARITY_THRESHOLD")
                .unwrap_or(base.text_similarity_threshold),
            audio_similarity_threshold: env_parse("VOXNOTE_AUDIO_SIMILARITY_THRESHOLD")
                .unwrap_or(base.audio_similarity_threshold),
            classify_timeout: env_parse("VOXNOTE_CLASSIFY_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(base.classify_timeout),
            embed_timeout: env_parse("VOXNOTE_EMBED_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(base.embed_timeout),
            max_transcript_chars: env_parse("VOXNOTE_MAX_TRANSCRIPT_CHARS")
                .unwrap_or(base.max_transcript_chars),
        }
    }

    pub fn with_max_categories(mut self, max: usize) -> Self {
        self.max_categories = max.max(1);
        self
    }

    pub fn with_thresholds(mut self, text: f32, audio: f32) -> Self {
        self.text_similarity_threshold = text;
        self.audio_similarity_threshold = audio;
        self
    }

    pub fn with_classify_timeout(mut self, timeout: Duration) -> Self {
        self.classify_timeout = timeout;
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn with_max_transcript_chars(mut self, max: usize) -> Self {
        self.max_transcript_chars = max;
        self
    }
}

// =============================================================================
// PER-USER SERIALIZATION
// =============================================================================

/// One async mutex per user, guarding resolution, centroid updates and
/// inserts.
///
/// Only users with a holder or waiter keep an entry: a mutex referenced by
/// the table alone is dropped on the next `lock` call.
#[derive(Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    pub async fn lock(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(user_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of users currently tracked.
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Where the transcript handed to the classifier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptSource {
    Device,
    Audio,
}

/// Ingestion pipeline over the remote store and the inference backends.
pub struct IngestionPipeline {
    categories: Arc<dyn CategoryRepository>,
    entries: Arc<dyn EntryRepository>,
    classifier: Arc<dyn ClassifierBackend>,
    embedder: Arc<dyn EmbeddingBackend>,
    transcriber: Option<Arc<dyn TranscriptionBackend>>,
    audio: Option<Arc<dyn AudioStore>>,
    centroids: CentroidMaintainer,
    resolver: CategoryResolver,
    locks: UserLocks,
    config: IngestConfig,
}

impl IngestionPipeline {
    pub fn new(
        categories: Arc<dyn CategoryRepository>,
        entries: Arc<dyn EntryRepository>,
        classifier: Arc<dyn ClassifierBackend>,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        let config = IngestConfig::default();
        let centroids = CentroidMaintainer::new(categories.clone(), entries.clone());
        let resolver = CategoryResolver::new(categories.clone(), centroids.clone())
            .with_max_categories(config.max_categories);
        Self {
            categories,
            entries,
            classifier,
            embedder,
            transcriber: None,
            audio: None,
            centroids,
            resolver,
            locks: UserLocks::default(),
            config,
        }
    }

    pub fn with_config(mut self, config: IngestConfig) -> Self {
        self.resolver = self.resolver.with_max_categories(config.max_categories);
        self.config = config;
        self
    }

    /// Enable audio re-transcription.
    pub fn with_audio(
        mut self,
        audio: Arc<dyn AudioStore>,
        transcriber: Arc<dyn TranscriptionBackend>,
    ) -> Self {
        self.audio = Some(audio);
        self.transcriber = Some(transcriber);
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn centroids(&self) -> &CentroidMaintainer {
        &self.centroids
    }

    /// Serialize centroid-affecting work for `user_id`.
    pub async fn lock_user(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        self.locks.lock(user_id).await
    }

    /// Ingest a transcript.
    pub async fn ingest(&self, req: IngestRequest) -> Result<Entry> {
        let start = Instant::now();
        self.validate(&req)?;
        let locale = if req.locale.trim().is_empty() {
            defaults::DEFAULT_LOCALE.to_string()
        } else {
            req.locale.trim().to_string()
        };

        let result = match req.category_id {
            Some(category_id) => self.ingest_manual(&req, category_id, &locale).await,
            None => self.ingest_ai(&req, &locale).await,
        };

        match &result {
            Ok(entry) => info!(
                subsystem = "ingest",
                component = "pipeline",
                op = "ingest",
                user_id = %req.user_id,
                entry_id = %entry.id,
                category_id = ?entry.category_id,
                client_id = ?req.client_id,
                manual = !req.is_ai(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Ingestion complete"
            ),
            Err(e) => warn!(
                subsystem = "ingest",
                component = "pipeline",
                op = "ingest",
                user_id = %req.user_id,
                client_id = ?req.client_id,
                error = %e,
                duration_ms = start.elapsed().as_millis() as u64,
                "Ingestion failed"
            ),
        }
        result
    }

    fn validate(&self, req: &IngestRequest) -> Result<()> {
        let chars = req.transcript.chars().count();
        if chars > self.config.max_transcript_chars {
            return Err(Error::InvalidInput(format!(
                "Transcript too long: {} characters (max {})",
                chars, self.config.max_transcript_chars
            )));
        }
        if req.transcript.trim().is_empty() && req.audio_ref.is_none() {
            return Err(Error::InvalidInput(
                "Transcript is empty and no audio is attached".to_string(),
            ));
        }
        Ok(())
    }

    async fn ingest_manual(
        &self,
        req: &IngestRequest,
        category_id: Uuid,
        locale: &str,
    ) -> Result<Entry> {
        let (transcript, _) = self.choose_transcript(req, locale).await?;

        // Fail fast on an unknown target before spending inference calls.
        if self.categories.get(req.user_id, category_id).await?.is_none() {
            return Err(Error::CategoryNotFound(category_id));
        }

        let title = match with_deadline(
            "title",
            self.config.classify_timeout,
            self.classifier.generate_title(&transcript, locale),
        )
        .await
        {
            Ok(title) if !title.trim().is_empty() => title,
            Ok(_) => fallback_title(&transcript),
            Err(e) => {
                warn!(
                    subsystem = "ingest",
                    component = "pipeline",
                    user_id = %req.user_id,
                    error = %e,
                    "Title generation failed, using transcript prefix"
                );
                fallback_title(&transcript)
            }
        };
        let embedding = self.embed(&transcript).await?;

        let _guard = self.lock_user(req.user_id).await;
        let category = self
            .categories
            .get(req.user_id, category_id)
            .await?
            .ok_or(Error::CategoryNotFound(category_id))?;
        self.centroids.update(&category, &embedding).await?;

        let inserted = self
            .entries
            .insert(NewEntry {
                user_id: req.user_id,
                transcript,
                title,
                category_id: Some(category_id),
                embedding_vector: Some(embedding),
                locale: locale.to_string(),
                audio_ref: req.audio_ref.clone(),
                is_pending: false,
            })
            .await;
        match inserted {
            Ok(entry) => Ok(entry),
            Err(e) => {
                self.undo_placement(req.user_id, category_id, false, category.embedding_centroid)
                    .await;
                Err(e)
            }
        }
    }

    async fn ingest_ai(&self, req: &IngestRequest, locale: &str) -> Result<Entry> {
        let (transcript, source) = self.choose_transcript(req, locale).await?;

        let hints = self.category_hints(req.user_id).await?;
        let classify_req = ClassifyRequest {
            transcript: transcript.clone(),
            categories: hints,
            locale: locale.to_string(),
        };
        let classification = with_deadline(
            "classify",
            self.config.classify_timeout,
            self.classifier.classify(&classify_req),
        )
        .await?;

        let cleaned = if classification.cleaned_transcript.trim().is_empty() {
            transcript
        } else {
            classification.cleaned_transcript.trim().to_string()
        };
        let embedding = self.embed(&cleaned).await?;

        let threshold = match source {
            TranscriptSource::Device => self.config.text_similarity_threshold,
            TranscriptSource::Audio => self.config.audio_similarity_threshold,
        };

        let _guard = self.lock_user(req.user_id).await;
        let existing = self.categories.list_active(req.user_id).await?;
        let centroid_before = |id: Uuid| {
            existing
                .iter()
                .find(|c| c.id == id)
                .and_then(|c| c.embedding_centroid.clone())
        };
        let ResolvedCategory {
            resolution, tier, ..
        } = self
            .resolver
            .resolve(req.user_id, &classification, &existing, &embedding, threshold)
            .await?;

        debug!(
            subsystem = "ingest",
            component = "pipeline",
            user_id = %req.user_id,
            tier = tier.as_str(),
            category_id = %resolution.category_id,
            is_new = resolution.is_new,
            confidence = classification.confidence,
            "Category resolved"
        );

        let title = if classification.title.trim().is_empty() {
            fallback_title(&cleaned)
        } else {
            classification.title.trim().to_string()
        };

        let inserted = self
            .entries
            .insert(NewEntry {
                user_id: req.user_id,
                transcript: cleaned,
                title,
                category_id: Some(resolution.category_id),
                embedding_vector: Some(embedding),
                locale: locale.to_string(),
                audio_ref: req.audio_ref.clone(),
                is_pending: true,
            })
            .await;
        match inserted {
            Ok(entry) => Ok(entry),
            Err(e) => {
                let previous = centroid_before(resolution.category_id);
                self.undo_placement(req.user_id, resolution.category_id, resolution.is_new, previous)
                    .await;
                Err(e)
            }
        }
    }

    /// Reverse the category side of a placement whose entry insert failed.
    ///
    /// A category created for this entry is deleted; otherwise the centroid
    /// goes back to its value before the update. Must run under the user lock.
    async fn undo_placement(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        created: bool,
        previous_centroid: Option<Vec<f32>>,
    ) {
        let result = if created {
            self.categories.delete(user_id, category_id).await
        } else {
            self.categories.set_centroid(category_id, previous_centroid).await
        };
        match result {
            Ok(()) => debug!(
                subsystem = "ingest",
                component = "pipeline",
                user_id = %user_id,
                category_id = %category_id,
                created,
                "Placement rolled back after failed insert"
            ),
            Err(e) => error!(
                subsystem = "ingest",
                component = "pipeline",
                user_id = %user_id,
                category_id = %category_id,
                created,
                error = %e,
                "Placement rollback failed"
            ),
        }
    }

    /// Pick the transcript to work with.
    ///
    /// Attached audio is re-transcribed first; the device transcript is the
    /// fallback when that fails or yields nothing.
    async fn choose_transcript(
        &self,
        req: &IngestRequest,
        locale: &str,
    ) -> Result<(String, TranscriptSource)> {
        let device = req.transcript.trim();

        if let Some(reference) = req.audio_ref.as_deref() {
            match self.transcribe_audio(reference, locale).await {
                Ok(Some(text)) => return Ok((text, TranscriptSource::Audio)),
                Ok(None) => debug!(
                    subsystem = "ingest",
                    component = "pipeline",
                    reference,
                    "Audio produced no text, using device transcript"
                ),
                Err(e) => warn!(
                    subsystem = "ingest",
                    component = "pipeline",
                    reference,
                    error = %e,
                    "Audio re-transcription failed, using device transcript"
                ),
            }
        }

        if device.is_empty() {
            return Err(Error::NoSpeech);
        }
        Ok((device.to_string(), TranscriptSource::Device))
    }

    async fn transcribe_audio(&self, reference: &str, locale: &str) -> Result<Option<String>> {
        let (Some(audio), Some(transcriber)) = (&self.audio, &self.transcriber) else {
            return Ok(None);
        };
        let Some(blob) = audio.fetch(reference).await? else {
            return Ok(None);
        };
        let result = transcriber
            .transcribe(&blob.bytes, &blob.mime_type, Some(locale))
            .await?;
        let text = result.text.trim();
        if text.is_empty() || text.chars().count() > self.config.max_transcript_chars {
            return Ok(None);
        }
        Ok(Some(text.to_string()))
    }

    async fn category_hints(&self, user_id: Uuid) -> Result<Vec<CategoryHint>> {
        let categories = self.categories.list_active(user_id).await?;
        let titles: HashMap<Uuid, String> =
            self.entries.latest_titles(user_id).await?.into_iter().collect();
        Ok(categories
            .into_iter()
            .map(|c| CategoryHint {
                recent_item: titles.get(&c.id).cloned(),
                name: c.name,
            })
            .collect())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        with_deadline("embed", self.config.embed_timeout, self.embedder.embed_one(text)).await
    }
}

/// Run `fut` under `deadline`; expiry is a hard `Error::Timeout`.
async fn with_deadline<T>(
    what: &str,
    deadline: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "{} exceeded {}ms",
            what,
            deadline.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxnote_db::MemoryStore;
    use voxnote_inference::mock::{MockClassifier, MockEmbedder};

    #[test]
    fn test_config_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.max_categories, 10);
        assert!((config.text_similarity_threshold - 0.60).abs() < f32::EPSILON);
        assert!((config.audio_similarity_threshold - 0.55).abs() < f32::EPSILON);
        assert_eq!(config.max_transcript_chars, 10_000);
    }

    #[test]
    fn test_config_builders() {
        let config = IngestConfig::default()
            .with_max_categories(0)
            .with_thresholds(0.7, 0.5)
            .with_embed_timeout(Duration::from_millis(5));
        assert_eq!(config.max_categories, 1);
        assert!((config.text_similarity_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.embed_timeout, Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_deadline_expiry_is_timeout() {
        let err = with_deadline("classify", Duration::from_millis(1), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<(), Error>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_validation_rejects_long_and_empty() {
        let store = MemoryStore::new();
        let pipeline = IngestionPipeline::new(
            Arc::new(store.clone()),
            Arc::new(store),
            Arc::new(MockClassifier::new()),
            Arc::new(MockEmbedder::new()),
        )
        .with_config(IngestConfig::default().with_max_transcript_chars(5));

        let mut req = IngestRequest {
            user_id: Uuid::new_v4(),
            transcript: "far too long".into(),
            locale: "en".into(),
            audio_ref: None,
            category_id: None,
            client_id: None,
        };
        assert!(matches!(
            pipeline.ingest(req.clone()).await,
            Err(Error::InvalidInput(_))
        ));

        req.transcript = "   ".into();
        assert!(matches!(
            pipeline.ingest(req).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_user_locks_serialize_same_user() {
        let locks = Arc::new(UserLocks::default());
        let user = Uuid::new_v4();
        let guard = locks.lock(user).await;

        let other = locks.lock(Uuid::new_v4()).await;
        drop(other);

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(user).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_user_locks_forget_idle_users() {
        let locks = UserLocks::default();
        for _ in 0..50 {
            let _guard = locks.lock(Uuid::new_v4()).await;
        }
        assert!(locks.tracked() <= 1);

        let held = locks.lock(Uuid::new_v4()).await;
        let _other = locks.lock(Uuid::new_v4()).await;
        assert_eq!(locks.tracked(), 2, "held locks are never pruned");
        drop(held);
    }
}
