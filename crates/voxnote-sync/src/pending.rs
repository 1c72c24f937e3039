//! Review lifecycle of AI-categorised entries.
//!
//! ```text
//! Unseen --open_category--> Seen --keep--> merged into note
//!   ^                        |  \
//!   |                        |   +--next open_category--> auto-merged
//!   +-------- move ----------+
//! ```
//!
//! Merging prepends the transcript to the category note body, so the newest
//! merge sits at the top. The merged entry is queued for remote deletion.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use voxnote_core::defaults;
use voxnote_core::{new_v7, Category, Entry, Error, ReviewState, Result, SyncStatus};

use crate::local::{LocalState, LocalStore};

/// Where a moved entry goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveTarget {
    Existing(Uuid),
    /// Create a category with this name locally and move into it.
    New(String),
}

/// Token restoring an entry to its place before a move.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoMove {
    pub entry_id: Uuid,
    pub previous_category: Option<Uuid>,
    pub previous_seen_at: Option<DateTime<Utc>>,
    /// Category created by the move, removed again on undo if still empty.
    pub created_category: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
}

impl UndoMove {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Result of opening a category.
#[derive(Debug, Clone, Default)]
pub struct OpenedCategory {
    /// Entries that were seen before and got merged into the note.
    pub merged: Vec<Uuid>,
    /// Entries now awaiting a keep or move decision, newest first.
    pub review: Vec<Entry>,
}

/// Drives pending entries through review on top of a [`LocalStore`].
#[derive(Clone)]
pub struct PendingEntryLifecycle {
    local: Arc<LocalStore>,
    undo_window: chrono::Duration,
}

impl PendingEntryLifecycle {
    pub fn new(local: Arc<LocalStore>) -> Self {
        Self {
            local,
            undo_window: chrono::Duration::seconds(defaults::UNDO_WINDOW_SECS as i64),
        }
    }

    pub fn with_undo_window(mut self, window: Duration) -> Self {
        if let Ok(window) = chrono::Duration::from_std(window) {
            self.undo_window = window;
        }
        self
    }

    /// Show a category: auto-merge what was already seen, then mark the
    /// unseen entries as seen and hand them out for review.
    pub fn open_category(&self, category_id: Uuid, now: DateTime<Utc>) -> Result<OpenedCategory> {
        let mut state = self.local.write();
        live_category(&state, category_id)?;

        let pending = state.entries_where(|e| e.category_id == Some(category_id) && e.is_pending);
        let mut opened = OpenedCategory::default();

        // entries_where is newest first; merge oldest first.
        for entry in pending
            .iter()
            .rev()
            .filter(|e| e.review_state() == ReviewState::Seen)
        {
            merge(&mut state, entry.id)?;
            opened.merged.push(entry.id);
        }

        for entry in pending
            .iter()
            .filter(|e| e.review_state() == ReviewState::Unseen)
        {
            let seen = state.edit_entry(entry.id, |e| e.seen_at = Some(now))?;
            opened.review.push(seen);
        }

        info!(
            subsystem = "sync",
            component = "pending",
            op = "open_category",
            category_id = %category_id,
            merged = opened.merged.len(),
            review = opened.review.len(),
            "Category opened"
        );
        Ok(opened)
    }

    /// Accept the AI placement: merge the transcript into the category note.
    pub fn keep(&self, entry_id: Uuid) -> Result<Category> {
        let mut state = self.local.write();
        let category = merge(&mut state, entry_id)?;
        debug!(
            subsystem = "sync",
            component = "pending",
            op = "keep",
            entry_id = %entry_id,
            category_id = %category.id,
            "Entry merged into note"
        );
        Ok(category)
    }

    /// Reassign an entry. The entry goes back to unseen in its new category.
    pub fn move_entry(
        &self,
        entry_id: Uuid,
        target: MoveTarget,
        now: DateTime<Utc>,
    ) -> Result<UndoMove> {
        let mut state = self.local.write();
        let entry = live_entry(&state, entry_id)?;
        let previous_category = entry.category_id;
        let previous_seen_at = entry.seen_at;

        let (destination, created_category) = match target {
            MoveTarget::Existing(id) => {
                live_category(&state, id)?;
                (id, None)
            }
            MoveTarget::New(name) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(Error::InvalidInput("Category name is empty".to_string()));
                }
                let category = Category::new(new_v7(), self.local.user_id(), name);
                let id = category.id;
                state.insert_category(category);
                (id, Some(id))
            }
        };

        state.edit_entry(entry_id, |e| {
            e.category_id = Some(destination);
            e.seen_at = None;
        })?;

        info!(
            subsystem = "sync",
            component = "pending",
            op = "move",
            entry_id = %entry_id,
            from = ?previous_category,
            to = %destination,
            new_category = created_category.is_some(),
            "Entry moved"
        );
        Ok(UndoMove {
            entry_id,
            previous_category,
            previous_seen_at,
            created_category,
            expires_at: now + self.undo_window,
        })
    }

    /// Reverse a move within the undo window.
    pub fn undo(&self, token: UndoMove, now: DateTime<Utc>) -> Result<Entry> {
        if token.is_expired(now) {
            return Err(Error::InvalidInput("Undo window has expired".to_string()));
        }
        let mut state = self.local.write();
        live_entry(&state, token.entry_id)?;
        let restored = state.edit_entry(token.entry_id, |e| {
            e.category_id = token.previous_category;
            e.seen_at = token.previous_seen_at;
        })?;

        if let Some(created) = token.created_category {
            let empty = state
                .category(created)
                .map(|c| c.status != SyncStatus::PendingDelete && c.record.entry_count == 0)
                .unwrap_or(false);
            if empty {
                state.delete_category(created)?;
            }
        }
        debug!(
            subsystem = "sync",
            component = "pending",
            op = "undo",
            entry_id = %token.entry_id,
            "Move undone"
        );
        Ok(restored)
    }
}

fn live_entry(state: &LocalState, id: Uuid) -> Result<Entry> {
    state
        .entry(id)
        .filter(|t| t.status != SyncStatus::PendingDelete)
        .map(|t| t.record.clone())
        .ok_or(Error::EntryNotFound(id))
}

fn live_category(state: &LocalState, id: Uuid) -> Result<Category> {
    state
        .category(id)
        .filter(|t| t.status != SyncStatus::PendingDelete)
        .map(|t| t.record.clone())
        .ok_or(Error::CategoryNotFound(id))
}

/// Text of a note body after `transcript` is merged into it.
pub fn prepend_to_note(transcript: &str, body: &str) -> String {
    let transcript = transcript.trim();
    if body.is_empty() {
        transcript.to_string()
    } else if transcript.is_empty() {
        body.to_string()
    } else {
        format!("{}{}{}", transcript, defaults::NOTE_SEPARATOR, body)
    }
}

fn merge(state: &mut LocalState, entry_id: Uuid) -> Result<Category> {
    let entry = live_entry(state, entry_id)?;
    let category_id = entry
        .category_id
        .ok_or_else(|| Error::InvalidInput("Entry has no category to merge into".to_string()))?;
    live_category(state, category_id)?;

    let category = state.edit_category(category_id, |c| {
        c.note_body = prepend_to_note(&entry.transcript, &c.note_body);
    })?;
    state.delete_entry(entry_id)?;
    Ok(category)
}
