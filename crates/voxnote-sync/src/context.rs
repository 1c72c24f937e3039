//! Derived display state for a client.
//!
//! [`AppContext`] is rebuilt from the durable [`LocalStore`] and the engine
//! status whenever the UI needs it. It holds no state of its own.

use serde::Serialize;
use uuid::Uuid;

use voxnote_core::{ReviewState, SyncStatus};

use crate::engine::{EngineStatus, PushStep, SyncReport};
use crate::local::LocalStore;

/// What the sync badge shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum SyncIndicator {
    Idle,
    Syncing,
    Failed(String),
}

/// One row of the category list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub id: Uuid,
    pub name: String,
    pub entry_count: i64,
    /// Entries waiting for keep or move (seen or not).
    pub pending_review: usize,
    /// Entries never shown yet; drives the "new" badge.
    pub unseen: usize,
    pub sync_status: SyncStatus,
}

/// Snapshot of everything a client screen renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppContext {
    pub categories: Vec<CategorySummary>,
    pub inbox_count: usize,
    /// Records carrying local intent not yet acknowledged.
    pub pending_changes: usize,
    pub sync: SyncIndicator,
    /// Last failure to ingest a queued entry, if any.
    pub ingest_error: Option<String>,
}

impl AppContext {
    pub fn derive(
        local: &LocalStore,
        status: &EngineStatus,
        last_report: Option<&SyncReport>,
    ) -> Self {
        let entries = local.entries();
        let categories = local
            .categories()
            .into_iter()
            .map(|c| {
                let members = entries.iter().filter(|e| e.category_id == Some(c.id));
                let mut pending_review = 0;
                let mut unseen = 0;
                for e in members {
                    match e.review_state() {
                        ReviewState::Unseen => {
                            pending_review += 1;
                            unseen += 1;
                        }
                        ReviewState::Seen => pending_review += 1,
                        ReviewState::Settled => {}
                    }
                }
                CategorySummary {
                    sync_status: local.category_status(c.id).unwrap_or_default(),
                    id: c.id,
                    name: c.name,
                    entry_count: c.entry_count,
                    pending_review,
                    unseen,
                }
            })
            .collect();

        let sync = if status.syncing {
            SyncIndicator::Syncing
        } else if let Some(message) = &status.last_error {
            SyncIndicator::Failed(message.clone())
        } else {
            SyncIndicator::Idle
        };

        let ingest_error = last_report.and_then(|r| {
            r.item_errors
                .iter()
                .rev()
                .find(|e| e.step == PushStep::CreateEntry)
                .map(|e| e.message.clone())
        });

        Self {
            categories,
            inbox_count: entries.iter().filter(|e| e.category_id.is_none()).count(),
            pending_changes: local.pending_count(),
            sync,
            ingest_error,
        }
    }

    pub fn category(&self, id: Uuid) -> Option<&CategorySummary> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// Total entries awaiting review across all categories.
    pub fn pending_review(&self) -> usize {
        self.categories.iter().map(|c| c.pending_review).sum()
    }
}
