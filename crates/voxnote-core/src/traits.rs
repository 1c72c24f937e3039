//! Core traits for voxnote abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::*;

// =============================================================================
// CATEGORY REPOSITORY TRAITS
// =============================================================================

/// Remote-store repository for categories.
///
/// Every read is scoped to a single user.
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Insert a category with a caller-chosen id.
    ///
    /// Returns `Error::Conflict` when the id already exists.
    async fn insert(&self, req: CreateCategoryRequest) -> Result<Category>;

    /// Fetch a category by id.
    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Category>>;

    /// Non-archived categories ordered by descending entry count.
    async fn list_active(&self, user_id: Uuid) -> Result<Vec<Category>>;

    /// Non-archived categories ordered by most recently updated.
    async fn list_recent(&self, user_id: Uuid) -> Result<Vec<Category>>;

    /// Replace the user-editable fields.
    async fn update(&self, user_id: Uuid, id: Uuid, req: UpdateCategoryRequest)
        -> Result<Category>;

    /// Hard-delete a category. Member entries fall back to the inbox.
    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<()>;

    /// Overwrite the centroid (or clear it with `None`).
    async fn set_centroid(&self, id: Uuid, centroid: Option<Vec<f32>>) -> Result<()>;

    /// Similarity query: best non-archived category whose centroid clears
    /// `threshold` by cosine similarity. Centroids whose dimension differs
    /// from `query` are skipped.
    async fn match_category(
        &self,
        user_id: Uuid,
        query: &[f32],
        threshold: f32,
    ) -> Result<Option<CategoryMatch>>;
}

// =============================================================================
// ENTRY REPOSITORY TRAITS
// =============================================================================

/// Remote-store repository for entries.
#[async_trait]
pub trait EntryRepository: Send + Sync {
    /// Insert an entry; the store assigns id and timestamps and bumps the
    /// category's entry count.
    async fn insert(&self, entry: NewEntry) -> Result<Entry>;

    /// Fetch an entry by id.
    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Entry>>;

    /// All entries of a user, newest first.
    async fn list(&self, user_id: Uuid) -> Result<Vec<Entry>>;

    /// Replace the user-editable fields.
    async fn update(&self, user_id: Uuid, id: Uuid, req: UpdateEntryRequest) -> Result<Entry>;

    /// Hard-delete an entry and return the removed row.
    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<Entry>;

    /// Embeddings of every entry currently filed under `category_id`.
    async fn embeddings_in_category(&self, category_id: Uuid) -> Result<Vec<Vec<f32>>>;

    /// Title of the most recent entry per category, used as classifier hints.
    async fn latest_titles(&self, user_id: Uuid) -> Result<Vec<(Uuid, String)>>;

    /// Clear audio references on entries created before `cutoff`.
    ///
    /// Returns the number of entries touched.
    async fn clear_expired_audio(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for multiple texts.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Expected embedding dimension.
    fn dimension(&self) -> usize;

    /// Model name used for embeddings.
    fn model_name(&self) -> &str;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_texts(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(Error::Embedding("Backend returned no vector".to_string())),
        }
    }
}

/// Backend for chat-style text generation.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate a response to `prompt` under the given system instruction.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate a response constrained to a single JSON object.
    ///
    /// Backends without a JSON mode fall back to plain generation.
    async fn generate_json(&self, system: &str, prompt: &str) -> Result<String> {
        self.generate_with_system(system, prompt).await
    }

    /// Model name used for generation.
    fn model_name(&self) -> &str;
}

/// Backend that turns a transcript into a typed classification.
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    /// Classify a transcript against the user's existing categories.
    async fn classify(&self, req: &ClassifyRequest) -> Result<ClassificationResult>;

    /// Generate a short title for a transcript (manual ingestion path).
    async fn generate_title(&self, transcript: &str, locale: &str) -> Result<String>;

    /// Model name used for classification.
    fn model_name(&self) -> &str;
}

/// Fetches raw audio bytes by opaque reference.
#[async_trait]
pub trait AudioStore: Send + Sync {
    /// Returns `Ok(None)` when the reference no longer resolves (for example
    /// after retention cleanup).
    async fn fetch(&self, reference: &str) -> Result<Option<AudioBlob>>;
}

// =============================================================================
// REMOTE API TRAIT
// =============================================================================

/// The remote CRUD surface as seen by the sync client.
///
/// Implemented in-process by the ingest service and over HTTP by the sync
/// crate's client. All mutating calls must be safe to repeat: a duplicate
/// create surfaces as `Error::Conflict`.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn create_category(&self, req: CreateCategoryRequest) -> Result<Category>;

    async fn update_category(
        &self,
        user_id: Uuid,
        id: Uuid,
        req: UpdateCategoryRequest,
    ) -> Result<Category>;

    async fn delete_category(&self, user_id: Uuid, id: Uuid) -> Result<()>;

    /// Non-archived categories ordered by recency.
    async fn list_categories(&self, user_id: Uuid) -> Result<Vec<Category>>;

    /// Create an entry by running it through the ingestion pipeline.
    async fn ingest_entry(&self, req: IngestRequest) -> Result<Entry>;

    async fn update_entry(&self, user_id: Uuid, id: Uuid, req: UpdateEntryRequest)
        -> Result<Entry>;

    async fn delete_entry(&self, user_id: Uuid, id: Uuid) -> Result<()>;

    async fn list_entries(&self, user_id: Uuid) -> Result<Vec<Entry>>;
}
