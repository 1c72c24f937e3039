//! Local mirror of categories and entries with per-record sync status.
//!
//! Every local mutation moves the record into a pending status and bumps its
//! revision. The sync engine acknowledges a push only when the revision it
//! sent is still current, so an edit made while a push is in flight stays
//! pending for the next cycle.
//!
//! Status transitions:
//!
//! | From | Local edit | Local delete | Remote ack |
//! |------|------------|--------------|------------|
//! | `Synced` | `PendingUpdate` | `PendingDelete` | - |
//! | `PendingCreate` | `PendingCreate` | `PendingDelete` | `Synced` |
//! | `PendingUpdate` | `PendingUpdate` | `PendingDelete` | `Synced` |
//! | `PendingDelete` | rejected | `PendingDelete` | removed |

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, trace};
use uuid::Uuid;

use voxnote_core::defaults;
use voxnote_core::{new_v7, Category, Entry, Error, Result, SyncStatus};

/// A mirrored record with its sync bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked<T> {
    pub record: T,
    pub status: SyncStatus,
    revision: u64,
}

impl<T> Tracked<T> {
    fn synced(record: T) -> Self {
        Self {
            record,
            status: SyncStatus::Synced,
            revision: 0,
        }
    }

    fn created(record: T) -> Self {
        Self {
            record,
            status: SyncStatus::PendingCreate,
            revision: 1,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) -> Result<()> {
        match self.status {
            SyncStatus::PendingDelete => {
                return Err(Error::InvalidInput(
                    "Record is queued for deletion".to_string(),
                ))
            }
            SyncStatus::Synced => self.status = SyncStatus::PendingUpdate,
            SyncStatus::PendingCreate | SyncStatus::PendingUpdate => {}
        }
        self.revision += 1;
        Ok(())
    }

    fn mark_deleted(&mut self) {
        self.status = SyncStatus::PendingDelete;
        self.revision += 1;
    }

    fn is_visible(&self) -> bool {
        self.status != SyncStatus::PendingDelete
    }
}

/// Outcome of applying a pull to the mirror.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullSummary {
    pub upserted: usize,
    pub skipped_pending: usize,
    pub removed: usize,
}

/// The mirror itself. Only reachable through [`LocalStore`] locks.
#[derive(Debug, Default)]
pub struct LocalState {
    categories: HashMap<Uuid, Tracked<Category>>,
    entries: HashMap<Uuid, Tracked<Entry>>,
}

impl LocalState {
    pub fn category(&self, id: Uuid) -> Option<&Tracked<Category>> {
        self.categories.get(&id)
    }

    pub fn entry(&self, id: Uuid) -> Option<&Tracked<Entry>> {
        self.entries.get(&id)
    }

    /// Apply a local edit to a category.
    pub fn edit_category(
        &mut self,
        id: Uuid,
        edit: impl FnOnce(&mut Category),
    ) -> Result<Category> {
        let tracked = self
            .categories
            .get_mut(&id)
            .ok_or(Error::CategoryNotFound(id))?;
        tracked.touch()?;
        edit(&mut tracked.record);
        tracked.record.last_updated = Utc::now();
        Ok(tracked.record.clone())
    }

    /// Apply a local edit to an entry. Category counts follow a move.
    pub fn edit_entry(&mut self, id: Uuid, edit: impl FnOnce(&mut Entry)) -> Result<Entry> {
        let current = self.entries.get(&id).ok_or(Error::EntryNotFound(id))?;
        let before = current.record.category_id;
        let mut entry = current.record.clone();
        edit(&mut entry);
        if before != entry.category_id {
            if let Some(target) = entry.category_id {
                if !self.categories.contains_key(&target) {
                    return Err(Error::CategoryNotFound(target));
                }
            }
        }
        entry.updated_at = Utc::now();

        let tracked = self.entries.get_mut(&id).ok_or(Error::EntryNotFound(id))?;
        tracked.touch()?;
        tracked.record = entry.clone();

        if before != entry.category_id {
            self.recount(before);
            self.recount(entry.category_id);
        }
        Ok(entry)
    }

    pub fn insert_category(&mut self, category: Category) {
        self.categories
            .insert(category.id, Tracked::created(category));
    }

    pub fn delete_entry(&mut self, id: Uuid) -> Result<()> {
        let tracked = self.entries.get_mut(&id).ok_or(Error::EntryNotFound(id))?;
        tracked.mark_deleted();
        let category_id = tracked.record.category_id;
        self.recount(category_id);
        Ok(())
    }

    pub fn delete_category(&mut self, id: Uuid) -> Result<()> {
        let tracked = self
            .categories
            .get_mut(&id)
            .ok_or(Error::CategoryNotFound(id))?;
        tracked.mark_deleted();
        Ok(())
    }

    /// Recompute the cached entry count of a category from the mirror.
    pub fn recount(&mut self, category_id: Option<Uuid>) {
        let Some(id) = category_id else {
            return;
        };
        let count = self
            .entries
            .values()
            .filter(|e| e.is_visible() && e.record.category_id == Some(id))
            .count() as i64;
        if let Some(c) = self.categories.get_mut(&id) {
            c.record.entry_count = count;
        }
    }

    pub(crate) fn entries_where(&self, pred: impl Fn(&Entry) -> bool) -> Vec<Entry> {
        let mut list: Vec<Entry> = self
            .entries
            .values()
            .filter(|e| e.is_visible() && pred(&e.record))
            .map(|e| e.record.clone())
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        list
    }
}

/// Offline-capable local store for one user.
#[derive(Debug)]
pub struct LocalStore {
    user_id: Uuid,
    state: RwLock<LocalState>,
}

impl LocalStore {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            state: RwLock::new(LocalState::default()),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, LocalState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run several mutations under one write lock.
    pub fn write(&self) -> RwLockWriteGuard<'_, LocalState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // CATEGORY MUTATIONS
    // =========================================================================

    /// Create a category locally with a client-chosen id.
    pub fn create_category(&self, name: &str) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Category name is empty".to_string()));
        }
        let category = Category::new(new_v7(), self.user_id, name);
        self.write().insert_category(category.clone());
        debug!(
            subsystem = "sync",
            component = "local",
            op = "create_category",
            category_id = %category.id,
            "Category queued for create"
        );
        Ok(category)
    }

    pub fn rename_category(&self, id: Uuid, name: &str) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Category name is empty".to_string()));
        }
        self.write().edit_category(id, |c| c.name = name.to_string())
    }

    pub fn set_archived(&self, id: Uuid, archived: bool) -> Result<Category> {
        self.write().edit_category(id, |c| c.is_archived = archived)
    }

    pub fn set_note_body(&self, id: Uuid, body: &str) -> Result<Category> {
        self.write().edit_category(id, |c| c.note_body = body.to_string())
    }

    pub fn delete_category(&self, id: Uuid) -> Result<()> {
        self.write().delete_category(id)
    }

    // =========================================================================
    // ENTRY MUTATIONS
    // =========================================================================

    /// Queue a new entry for ingestion.
    ///
    /// `category_id` selects the manual path; `None` asks for AI placement.
    pub fn add_entry(
        &self,
        transcript: &str,
        locale: &str,
        category_id: Option<Uuid>,
        audio_ref: Option<String>,
    ) -> Result<Entry> {
        if transcript.trim().is_empty() && audio_ref.is_none() {
            return Err(Error::InvalidInput(
                "Transcript is empty and no audio is attached".to_string(),
            ));
        }
        let now = Utc::now();
        let entry = Entry {
            id: new_v7(),
            user_id: self.user_id,
            transcript: transcript.trim().to_string(),
            title: defaults::FALLBACK_TITLE.to_string(),
            category_id,
            embedding_vector: None,
            locale: locale.to_string(),
            audio_ref,
            created_at: now,
            updated_at: now,
            is_pending: false,
            seen_at: None,
        };

        let mut state = self.write();
        if let Some(cid) = category_id {
            if !state.categories.contains_key(&cid) {
                return Err(Error::CategoryNotFound(cid));
            }
        }
        state.entries.insert(entry.id, Tracked::created(entry.clone()));
        state.recount(category_id);
        debug!(
            subsystem = "sync",
            component = "local",
            op = "add_entry",
            entry_id = %entry.id,
            manual = category_id.is_some(),
            "Entry queued for ingestion"
        );
        Ok(entry)
    }

    pub fn edit_entry(&self, id: Uuid, title: &str, transcript: &str) -> Result<Entry> {
        self.write().edit_entry(id, |e| {
            e.title = title.to_string();
            e.transcript = transcript.to_string();
        })
    }

    pub fn delete_entry(&self, id: Uuid) -> Result<()> {
        self.write().delete_entry(id)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn category(&self, id: Uuid) -> Option<Category> {
        self.read().category(id).map(|t| t.record.clone())
    }

    pub fn category_status(&self, id: Uuid) -> Option<SyncStatus> {
        self.read().category(id).map(|t| t.status)
    }

    pub fn entry(&self, id: Uuid) -> Option<Entry> {
        self.read().entry(id).map(|t| t.record.clone())
    }

    pub fn entry_status(&self, id: Uuid) -> Option<SyncStatus> {
        self.read().entry(id).map(|t| t.status)
    }

    /// Visible, non-archived categories, most recently updated first.
    pub fn categories(&self) -> Vec<Category> {
        let state = self.read();
        let mut list: Vec<Category> = state
            .categories
            .values()
            .filter(|c| c.is_visible() && !c.record.is_archived)
            .map(|c| c.record.clone())
            .collect();
        list.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        list
    }

    /// Visible entries, newest first.
    pub fn entries(&self) -> Vec<Entry> {
        self.read().entries_where(|_| true)
    }

    pub fn entries_in(&self, category_id: Uuid) -> Vec<Entry> {
        self.read()
            .entries_where(|e| e.category_id == Some(category_id))
    }

    /// Entries without a category.
    pub fn inbox(&self) -> Vec<Entry> {
        self.read().entries_where(|e| e.category_id.is_none())
    }

    /// Number of records carrying local intent.
    pub fn pending_count(&self) -> usize {
        let state = self.read();
        state
            .categories
            .values()
            .filter(|c| c.status.is_pending())
            .count()
            + state
                .entries
                .values()
                .filter(|e| e.status.is_pending())
                .count()
    }

    /// Every category including those queued for deletion.
    pub fn all_categories(&self) -> Vec<Tracked<Category>> {
        self.read().categories.values().cloned().collect()
    }

    /// Every entry including those queued for deletion.
    pub fn all_entries(&self) -> Vec<Tracked<Entry>> {
        self.read().entries.values().cloned().collect()
    }

    // =========================================================================
    // SYNC ENGINE HOOKS
    // =========================================================================

    /// Categories in `status` with their revision, oldest first.
    pub(crate) fn pending_categories(&self, status: SyncStatus) -> Vec<(Category, u64)> {
        let state = self.read();
        let mut list: Vec<(Category, u64)> = state
            .categories
            .values()
            .filter(|c| c.status == status)
            .map(|c| (c.record.clone(), c.revision))
            .collect();
        list.sort_by(|a, b| a.0.created_at.cmp(&b.0.created_at).then(a.0.id.cmp(&b.0.id)));
        list
    }

    /// Entries in `status` with their revision, oldest first.
    pub(crate) fn pending_entries(&self, status: SyncStatus) -> Vec<(Entry, u64)> {
        let state = self.read();
        let mut list: Vec<(Entry, u64)> = state
            .entries
            .values()
            .filter(|e| e.status == status)
            .map(|e| (e.record.clone(), e.revision))
            .collect();
        list.sort_by(|a, b| a.0.created_at.cmp(&b.0.created_at).then(a.0.id.cmp(&b.0.id)));
        list
    }

    /// Acknowledge a pushed category. Returns false when it changed meanwhile.
    pub(crate) fn mark_category_synced(&self, id: Uuid, revision: u64) -> bool {
        let mut state = self.write();
        match state.categories.get_mut(&id) {
            Some(t) if t.revision == revision && t.status != SyncStatus::PendingDelete => {
                t.status = SyncStatus::Synced;
                true
            }
            _ => false,
        }
    }

    /// Acknowledge a remote create (or a duplicate create).
    ///
    /// An edit made while the create was in flight leaves the category
    /// pending as an update, since the remote record now exists.
    pub(crate) fn mark_category_created(&self, id: Uuid, revision: u64) {
        let mut state = self.write();
        if let Some(t) = state.categories.get_mut(&id) {
            match t.status {
                SyncStatus::PendingCreate if t.revision == revision => {
                    t.status = SyncStatus::Synced
                }
                SyncStatus::PendingCreate => t.status = SyncStatus::PendingUpdate,
                _ => {}
            }
        }
    }

    /// Acknowledge a pushed entry. Returns false when it changed meanwhile.
    pub(crate) fn mark_entry_synced(&self, id: Uuid, revision: u64) -> bool {
        let mut state = self.write();
        match state.entries.get_mut(&id) {
            Some(t) if t.revision == revision && t.status != SyncStatus::PendingDelete => {
                t.status = SyncStatus::Synced;
                true
            }
            _ => false,
        }
    }

    /// Replace a provisional entry with the server-confirmed record.
    ///
    /// When the provisional entry was edited or deleted while the create was
    /// in flight, the server record is kept under its new id but carries the
    /// local intent forward as a pending update or delete.
    pub(crate) fn confirm_entry(&self, provisional_id: Uuid, revision: u64, server: Entry) {
        let mut state = self.write();
        let local = state.entries.remove(&provisional_id);
        let server_id = server.id;
        let server_category = server.category_id;

        let tracked = match local {
            Some(local) if local.revision != revision => {
                let mut record = server;
                let status = if local.status == SyncStatus::PendingDelete {
                    SyncStatus::PendingDelete
                } else {
                    record.title = local.record.title.clone();
                    record.transcript = local.record.transcript.clone();
                    if local.record.category_id.is_some() {
                        record.category_id = local.record.category_id;
                    }
                    SyncStatus::PendingUpdate
                };
                Tracked {
                    record,
                    status,
                    revision: 1,
                }
            }
            _ => Tracked::synced(server),
        };
        let final_category = tracked.record.category_id;
        state.entries.insert(server_id, tracked);
        state.recount(server_category);
        if final_category != server_category {
            state.recount(final_category);
        }
        trace!(
            subsystem = "sync",
            component = "local",
            provisional_id = %provisional_id,
            entry_id = %server_id,
            "Provisional entry replaced"
        );
    }

    pub(crate) fn remove_category(&self, id: Uuid) {
        self.write().categories.remove(&id);
    }

    pub(crate) fn remove_entry(&self, id: Uuid) {
        let mut state = self.write();
        if let Some(removed) = state.entries.remove(&id) {
            state.recount(removed.record.category_id);
        }
    }

    /// Merge the authoritative remote lists into the mirror.
    ///
    /// Records carrying a pending status are left alone. Synced records the
    /// remote no longer returns are removed.
    pub(crate) fn apply_pull(&self, categories: Vec<Category>, entries: Vec<Entry>) -> PullSummary {
        let mut summary = PullSummary::default();
        let mut state = self.write();

        let remote_categories: HashSet<Uuid> = categories.iter().map(|c| c.id).collect();
        for category in categories {
            match state.categories.get(&category.id) {
                Some(t) if t.status.is_pending() => summary.skipped_pending += 1,
                _ => {
                    state
                        .categories
                        .insert(category.id, Tracked::synced(category));
                    summary.upserted += 1;
                }
            }
        }

        let remote_entries: HashSet<Uuid> = entries.iter().map(|e| e.id).collect();
        for entry in entries {
            match state.entries.get(&entry.id) {
                Some(t) if t.status.is_pending() => summary.skipped_pending += 1,
                _ => {
                    state.entries.insert(entry.id, Tracked::synced(entry));
                    summary.upserted += 1;
                }
            }
        }

        let before = state.categories.len() + state.entries.len();
        state
            .categories
            .retain(|id, t| t.status.is_pending() || remote_categories.contains(id));
        state
            .entries
            .retain(|id, t| t.status.is_pending() || remote_entries.contains(id));
        summary.removed = before - (state.categories.len() + state.entries.len());
        summary
    }
}
