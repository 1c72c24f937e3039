//! Core data models for voxnote.
//!
//! These types are shared across all voxnote crates. Categories and entries
//! form an arena keyed by id: an entry refers to its category only through
//! `category_id`, never through an embedded parent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// CATEGORY TYPES
// =============================================================================

/// A semantic category that groups entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    /// Maintained by the remote store; the core only reads it.
    #[serde(default)]
    pub entry_count: i64,
    /// Running mean of member entry embeddings.
    #[serde(default)]
    pub embedding_centroid: Option<Vec<f32>>,
    /// Free-form note body that merged entries are prepended to.
    #[serde(default)]
    pub note_body: String,
    #[serde(default)]
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Category {
    /// Build a fresh, empty category owned by `user_id`.
    pub fn new(id: Uuid, user_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            name: name.into(),
            entry_count: 0,
            embedding_centroid: None,
            note_body: String::new(),
            is_archived: false,
            created_at: now,
            last_updated: now,
        }
    }
}

/// Request for creating a category on the remote store.
///
/// The id is chosen by the caller (usually the client), which makes a
/// repeated create detectable as a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategoryRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub note_body: String,
    #[serde(default)]
    pub embedding_centroid: Option<Vec<f32>>,
}

/// Full-state update of the user-editable category fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: String,
    pub note_body: String,
    pub is_archived: bool,
}

impl From<&Category> for UpdateCategoryRequest {
    fn from(c: &Category) -> Self {
        Self {
            name: c.name.clone(),
            note_body: c.note_body.clone(),
            is_archived: c.is_archived,
        }
    }
}

/// Best category returned by the similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMatch {
    pub category_id: Uuid,
    pub name: String,
    pub similarity: f32,
}

// =============================================================================
// ENTRY TYPES
// =============================================================================

/// A single ingested transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transcript: String,
    pub title: String,
    /// `None` means the entry sits in the inbox.
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub embedding_vector: Option<Vec<f32>>,
    pub locale: String,
    /// Opaque audio reference; cleared externally after the retention window.
    #[serde(default)]
    pub audio_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_pending: bool,
    #[serde(default)]
    pub seen_at: Option<DateTime<Utc>>,
}

impl Entry {
    /// Current review state derived from `is_pending` and `seen_at`.
    pub fn review_state(&self) -> ReviewState {
        match (self.is_pending, self.seen_at) {
            (false, _) => ReviewState::Settled,
            (true, None) => ReviewState::Unseen,
            (true, Some(_)) => ReviewState::Seen,
        }
    }
}

/// Review state of an entry as seen by the pending-entry lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    /// Pending and never displayed.
    Unseen,
    /// Pending and displayed at least once.
    Seen,
    /// Not pending (manually filed or already reviewed).
    Settled,
}

/// Full-state update of the user-editable entry fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEntryRequest {
    pub title: String,
    pub transcript: String,
    pub category_id: Option<Uuid>,
    pub is_pending: bool,
    pub seen_at: Option<DateTime<Utc>>,
}

impl From<&Entry> for UpdateEntryRequest {
    fn from(e: &Entry) -> Self {
        Self {
            title: e.title.clone(),
            transcript: e.transcript.clone(),
            category_id: e.category_id,
            is_pending: e.is_pending,
            seen_at: e.seen_at,
        }
    }
}

/// Row written by the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub user_id: Uuid,
    pub transcript: String,
    pub title: String,
    pub category_id: Option<Uuid>,
    pub embedding_vector: Option<Vec<f32>>,
    pub locale: String,
    pub audio_ref: Option<String>,
    pub is_pending: bool,
}

// =============================================================================
// SYNC TYPES
// =============================================================================

/// Client-side synchronisation state of a mirrored record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Synced,
    PendingCreate,
    PendingUpdate,
    PendingDelete,
}

impl SyncStatus {
    /// Whether the record carries local intent not yet acknowledged remotely.
    pub fn is_pending(self) -> bool {
        !matches!(self, SyncStatus::Synced)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Synced => write!(f, "synced"),
            Self::PendingCreate => write!(f, "pending_create"),
            Self::PendingUpdate => write!(f, "pending_update"),
            Self::PendingDelete => write!(f, "pending_delete"),
        }
    }
}

// =============================================================================
// INGESTION TYPES
// =============================================================================

/// Ingestion request, shared by the HTTP surface and the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub user_id: Uuid,
    /// Device-side transcript (may be empty when audio is attached).
    #[serde(default)]
    pub transcript: String,
    pub locale: String,
    #[serde(default)]
    pub audio_ref: Option<String>,
    /// When set, the manual path is taken and classification is skipped.
    #[serde(default)]
    pub category_id: Option<Uuid>,
    /// Provisional client id, echoed for log correlation only.
    #[serde(default)]
    pub client_id: Option<Uuid>,
}

impl IngestRequest {
    /// Whether this request asks for AI categorisation.
    pub fn is_ai(&self) -> bool {
        self.category_id.is_none()
    }
}

/// Existing category as presented to the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryHint {
    pub name: String,
    /// Title of a representative recent entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_item: Option<String>,
}

/// Request sent to the classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub transcript: String,
    pub categories: Vec<CategoryHint>,
    pub locale: String,
}

/// Structured classifier output, consumed immediately by the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub cleaned_transcript: String,
    pub title: String,
    pub category_name: String,
    pub is_explicit_placement: bool,
    pub confidence: f32,
    #[serde(default)]
    pub suggested_new_category: Option<String>,
}

/// Outcome of category resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub category_id: Uuid,
    pub is_new: bool,
}

/// Raw audio fetched by reference.
#[derive(Debug, Clone)]
pub struct AudioBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}
