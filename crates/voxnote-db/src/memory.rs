//! In-memory remote store.
//!
//! Implements the same repository contracts as the PostgreSQL store, including
//! entry-count maintenance and the similarity query, so the ingestion pipeline
//! and the sync engine can run end to end without a database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use voxnote_core::{
    cosine_similarity, new_v7, Category, CategoryMatch, CategoryRepository,
    CreateCategoryRequest, Entry, EntryRepository, Error, NewEntry, Result,
    UpdateCategoryRequest, UpdateEntryRequest,
};

#[derive(Default)]
struct MemoryState {
    categories: HashMap<Uuid, Category>,
    /// Entries with their insertion sequence number.
    entries: HashMap<Uuid, (u64, Entry)>,
    next_seq: u64,
}

impl MemoryState {
    /// Entries may only be filed under the owner's own categories.
    fn owned_category(&self, user_id: Uuid, id: Uuid) -> Result<&Category> {
        self.categories
            .get(&id)
            .filter(|c| c.user_id == user_id)
            .ok_or(Error::CategoryNotFound(id))
    }

    fn adjust_count(&mut self, category_id: Option<Uuid>, delta: i64) {
        if let Some(c) = category_id.and_then(|id| self.categories.get_mut(&id)) {
            c.entry_count = (c.entry_count + delta).max(0);
        }
    }

    fn active_for(&self, user_id: Uuid) -> Vec<&Category> {
        let mut list: Vec<&Category> = self
            .categories
            .values()
            .filter(|c| c.user_id == user_id && !c.is_archived)
            .collect();
        list.sort_by(|a, b| {
            b.entry_count
                .cmp(&a.entry_count)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        list
    }
}

/// Shared, cloneable in-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of categories across all users.
    pub async fn category_count(&self) -> usize {
        self.state.read().await.categories.len()
    }

    /// Number of entries across all users.
    pub async fn entry_count(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Overwrite an entry's creation time (test helper for retention).
    pub async fn backdate_entry(&self, id: Uuid, created_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        let (_, entry) = state
            .entries
            .get_mut(&id)
            .ok_or(Error::EntryNotFound(id))?;
        entry.created_at = created_at;
        Ok(())
    }
}

#[async_trait]
impl CategoryRepository for MemoryStore {
    async fn insert(&self, req: CreateCategoryRequest) -> Result<Category> {
        let mut state = self.state.write().await;
        if state.categories.contains_key(&req.id) {
            return Err(Error::Conflict(format!("category {} already exists", req.id)));
        }
        let mut category = Category::new(req.id, req.user_id, req.name);
        category.note_body = req.note_body;
        category.embedding_centroid = req.embedding_centroid;
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Category>> {
        let state = self.state.read().await;
        Ok(state
            .categories
            .get(&id)
            .filter(|c| c.user_id == user_id)
            .cloned())
    }

    async fn list_active(&self, user_id: Uuid) -> Result<Vec<Category>> {
        let state = self.state.read().await;
        Ok(state.active_for(user_id).into_iter().cloned().collect())
    }

    async fn list_recent(&self, user_id: Uuid) -> Result<Vec<Category>> {
        let state = self.state.read().await;
        let mut list: Vec<Category> = state
            .categories
            .values()
            .filter(|c| c.user_id == user_id && !c.is_archived)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(list)
    }

    async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        req: UpdateCategoryRequest,
    ) -> Result<Category> {
        let mut state = self.state.write().await;
        let category = state
            .categories
            .get_mut(&id)
            .filter(|c| c.user_id == user_id)
            .ok_or(Error::CategoryNotFound(id))?;
        category.name = req.name;
        category.note_body = req.note_body;
        category.is_archived = req.is_archived;
        category.last_updated = Utc::now();
        Ok(category.clone())
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        match state.categories.get(&id) {
            Some(c) if c.user_id == user_id => {}
            _ => return Err(Error::CategoryNotFound(id)),
        }
        state.categories.remove(&id);
        for (_, entry) in state.entries.values_mut() {
            if entry.category_id == Some(id) {
                entry.category_id = None;
            }
        }
        Ok(())
    }

    async fn set_centroid(&self, id: Uuid, centroid: Option<Vec<f32>>) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(category) = state.categories.get_mut(&id) {
            category.embedding_centroid = centroid;
            category.last_updated = Utc::now();
        }
        Ok(())
    }

    async fn match_category(
        &self,
        user_id: Uuid,
        query: &[f32],
        threshold: f32,
    ) -> Result<Option<CategoryMatch>> {
        let state = self.state.read().await;
        let mut best: Option<CategoryMatch> = None;
        for category in state.active_for(user_id) {
            let Some(centroid) = category.embedding_centroid.as_deref() else {
                continue;
            };
            let Some(similarity) = cosine_similarity(centroid, query) else {
                continue;
            };
            if similarity <= threshold || similarity.is_nan() {
                continue;
            }
            if best.as_ref().map_or(true, |b| similarity > b.similarity) {
                best = Some(CategoryMatch {
                    category_id: category.id,
                    name: category.name.clone(),
                    similarity,
                });
            }
        }
        Ok(best)
    }
}

#[async_trait]
impl EntryRepository for MemoryStore {
    async fn insert(&self, new: NewEntry) -> Result<Entry> {
        let mut state = self.state.write().await;
        if let Some(cid) = new.category_id {
            state.owned_category(new.user_id, cid)?;
        }
        let now = Utc::now();
        let entry = Entry {
            id: new_v7(),
            user_id: new.user_id,
            transcript: new.transcript,
            title: new.title,
            category_id: new.category_id,
            embedding_vector: new.embedding_vector,
            locale: new.locale,
            audio_ref: new.audio_ref,
            created_at: now,
            updated_at: now,
            is_pending: new.is_pending,
            seen_at: None,
        };
        let seq = state.next_seq;
        state.next_seq += 1;
        state.adjust_count(entry.category_id, 1);
        state.entries.insert(entry.id, (seq, entry.clone()));
        Ok(entry)
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Entry>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .get(&id)
            .map(|(_, e)| e)
            .filter(|e| e.user_id == user_id)
            .cloned())
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<Entry>> {
        let state = self.state.read().await;
        let mut list: Vec<&(u64, Entry)> = state
            .entries
            .values()
            .filter(|(_, e)| e.user_id == user_id)
            .collect();
        list.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(list.into_iter().map(|(_, e)| e.clone()).collect())
    }

    async fn update(&self, user_id: Uuid, id: Uuid, req: UpdateEntryRequest) -> Result<Entry> {
        let mut state = self.state.write().await;
        if let Some(cid) = req.category_id {
            state.owned_category(user_id, cid)?;
        }
        let previous = match state.entries.get(&id) {
            Some((_, e)) if e.user_id == user_id => e.category_id,
            _ => return Err(Error::EntryNotFound(id)),
        };
        if previous != req.category_id {
            state.adjust_count(previous, -1);
            state.adjust_count(req.category_id, 1);
        }
        let (_, entry) = state
            .entries
            .get_mut(&id)
            .ok_or(Error::EntryNotFound(id))?;
        entry.title = req.title;
        entry.transcript = req.transcript;
        entry.category_id = req.category_id;
        entry.is_pending = req.is_pending;
        entry.seen_at = req.seen_at;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<Entry> {
        let mut state = self.state.write().await;
        match state.entries.get(&id) {
            Some((_, e)) if e.user_id == user_id => {}
            _ => return Err(Error::EntryNotFound(id)),
        }
        let (_, entry) = state
            .entries
            .remove(&id)
            .ok_or(Error::EntryNotFound(id))?;
        state.adjust_count(entry.category_id, -1);
        Ok(entry)
    }

    async fn embeddings_in_category(&self, category_id: Uuid) -> Result<Vec<Vec<f32>>> {
        let state = self.state.read().await;
        let mut members: Vec<&(u64, Entry)> = state
            .entries
            .values()
            .filter(|(_, e)| e.category_id == Some(category_id))
            .collect();
        members.sort_by_key(|(seq, _)| *seq);
        Ok(members
            .into_iter()
            .filter_map(|(_, e)| e.embedding_vector.clone())
            .collect())
    }

    async fn latest_titles(&self, user_id: Uuid) -> Result<Vec<(Uuid, String)>> {
        let state = self.state.read().await;
        let mut latest: HashMap<Uuid, (u64, &str)> = HashMap::new();
        for (seq, entry) in state.entries.values() {
            let Some(cid) = entry.category_id.filter(|_| entry.user_id == user_id) else {
                continue;
            };
            let slot = latest.entry(cid).or_insert((*seq, entry.title.as_str()));
            if *seq > slot.0 {
                *slot = (*seq, entry.title.as_str());
            }
        }
        Ok(latest
            .into_iter()
            .map(|(cid, (_, title))| (cid, title.to_string()))
            .collect())
    }

    async fn clear_expired_audio(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut cleared = 0;
        for (_, entry) in state.entries.values_mut() {
            if entry.audio_ref.is_some() && entry.created_at < cutoff {
                entry.audio_ref = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_entry(user_id: Uuid, category_id: Option<Uuid>, title: &str, v: Vec<f32>) -> NewEntry {
        NewEntry {
            user_id,
            transcript: format!("{} transcript", title),
            title: title.to_string(),
            category_id,
            embedding_vector: Some(v),
            locale: "en".to_string(),
            audio_ref: None,
            is_pending: true,
        }
    }

    async fn category(store: &MemoryStore, user_id: Uuid, name: &str) -> Category {
        CategoryRepository::insert(
            store,
            CreateCategoryRequest {
                id: Uuid::new_v4(),
                user_id,
                name: name.to_string(),
                note_body: String::new(),
                embedding_centroid: None,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_category_is_conflict() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let c = category(&store, user, "Work").await;
        let err = CategoryRepository::insert(
            &store,
            CreateCategoryRequest {
                id: c.id,
                user_id: user,
                name: "Work".to_string(),
                note_body: String::new(),
                embedding_centroid: None,
            },
        )
        .await
        .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_entry_count_follows_membership() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let a = category(&store, user, "A").await;
        let b = category(&store, user, "B").await;

        let e = EntryRepository::insert(&store, new_entry(user, Some(a.id), "x", vec![1.0]))
            .await
            .unwrap();
        assert_eq!(CategoryRepository::get(&store, user, a.id).await.unwrap().unwrap().entry_count, 1);

        let mut req = UpdateEntryRequest::from(&e);
        req.category_id = Some(b.id);
        EntryRepository::update(&store, user, e.id, req).await.unwrap();
        assert_eq!(CategoryRepository::get(&store, user, a.id).await.unwrap().unwrap().entry_count, 0);
        assert_eq!(CategoryRepository::get(&store, user, b.id).await.unwrap().unwrap().entry_count, 1);

        EntryRepository::delete(&store, user, e.id).await.unwrap();
        assert_eq!(CategoryRepository::get(&store, user, b.id).await.unwrap().unwrap().entry_count, 0);
    }

    #[tokio::test]
    async fn test_list_active_orders_by_entry_count() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let small = category(&store, user, "Small").await;
        let big = category(&store, user, "Big").await;
        for i in 0..2 {
            EntryRepository::insert(&store, new_entry(user, Some(big.id), &i.to_string(), vec![1.0]))
                .await
                .unwrap();
        }
        EntryRepository::insert(&store, new_entry(user, Some(small.id), "s", vec![1.0]))
            .await
            .unwrap();

        let names: Vec<String> = store
            .list_active(user)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Big", "Small"]);
    }

    #[tokio::test]
    async fn test_match_skips_archived_and_other_dimensions() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let archived = category(&store, user, "Old").await;
        let wide = category(&store, user, "Wide").await;
        let good = category(&store, user, "Good").await;

        store.set_centroid(archived.id, Some(vec![1.0, 0.0])).await.unwrap();
        CategoryRepository::update(
            &store,
            user,
            archived.id,
            UpdateCategoryRequest {
                name: "Old".into(),
                note_body: String::new(),
                is_archived: true,
            },
        )
        .await
        .unwrap();
        store.set_centroid(wide.id, Some(vec![1.0, 0.0, 0.0])).await.unwrap();
        store.set_centroid(good.id, Some(vec![0.8, 0.6])).await.unwrap();

        let m = store
            .match_category(user, &[1.0, 0.0], 0.5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(m.category_id, good.id);
        assert!((m.similarity - 0.8).abs() < 1e-6);

        assert!(store
            .match_category(user, &[1.0, 0.0], 0.9)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_category_moves_entries_to_inbox() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let c = category(&store, user, "Temp").await;
        let e = EntryRepository::insert(&store, new_entry(user, Some(c.id), "x", vec![1.0]))
            .await
            .unwrap();

        CategoryRepository::delete(&store, user, c.id).await.unwrap();
        let e = EntryRepository::get(&store, user, e.id).await.unwrap().unwrap();
        assert!(e.category_id.is_none());
    }

    #[tokio::test]
    async fn test_other_users_records_are_invisible() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let c = category(&store, owner, "Mine").await;
        let stranger = Uuid::new_v4();
        assert!(CategoryRepository::get(&store, stranger, c.id).await.unwrap().is_none());
        assert!(CategoryRepository::delete(&store, stranger, c.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_latest_titles_per_category() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let c = category(&store, user, "Travel").await;
        EntryRepository::insert(&store, new_entry(user, Some(c.id), "Lisbon flights", vec![1.0]))
            .await
            .unwrap();
        EntryRepository::insert(&store, new_entry(user, Some(c.id), "Porto hotel", vec![1.0]))
            .await
            .unwrap();
        EntryRepository::insert(&store, new_entry(user, None, "Inbox thing", vec![1.0]))
            .await
            .unwrap();

        let titles = store.latest_titles(user).await.unwrap();
        assert_eq!(titles, vec![(c.id, "Porto hotel".to_string())]);
    }

    #[tokio::test]
    async fn test_clear_expired_audio() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let mut old = new_entry(user, None, "old", vec![1.0]);
        old.audio_ref = Some("old.wav".into());
        let mut fresh = new_entry(user, None, "fresh", vec![1.0]);
        fresh.audio_ref = Some("fresh.wav".into());

        let old = EntryRepository::insert(&store, old).await.unwrap();
        let fresh = EntryRepository::insert(&store, fresh).await.unwrap();
        store
            .backdate_entry(old.id, Utc::now() - Duration::hours(25))
            .await
            .unwrap();

        let cleared = store
            .clear_expired_audio(Utc::now() - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(cleared, 1);
        let old = EntryRepository::get(&store, user, old.id).await.unwrap().unwrap();
        let fresh = EntryRepository::get(&store, user, fresh.id).await.unwrap().unwrap();
        assert!(old.audio_ref.is_none());
        assert_eq!(fresh.audio_ref.as_deref(), Some("fresh.wav"));
    }

    #[tokio::test]
    async fn test_entries_stay_within_owner_categories() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let diary = category(&store, owner, "Diary").await;

        let err = EntryRepository::insert(&store, new_entry(other, Some(diary.id), "peek", vec![1.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CategoryNotFound(id) if id == diary.id));

        let own = EntryRepository::insert(&store, new_entry(other, None, "mine", vec![1.0]))
            .await
            .unwrap();
        let mut req = UpdateEntryRequest::from(&own);
        req.category_id = Some(diary.id);
        let err = EntryRepository::update(&store, other, own.id, req)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CategoryNotFound(_)));

        let diary = CategoryRepository::get(&store, owner, diary.id).await.unwrap().unwrap();
        assert_eq!(diary.entry_count, 0);
        let own = EntryRepository::get(&store, other, own.id).await.unwrap().unwrap();
        assert_eq!(own.category_id, None);
    }
}
