//! Category centroid maintenance.
//!
//! A centroid is the element-wise mean of the embeddings of a category's
//! entries. Inserts fold the new embedding in incrementally; removals
//! recompute the mean from the remaining members.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use voxnote_core::{mean_of, Category, CategoryRepository, EntryRepository, Result};

/// Result of folding one embedding into a centroid.
#[derive(Debug, Clone, PartialEq)]
pub enum CentroidUpdate {
    /// The category had no centroid; the embedding becomes it.
    Initialized(Vec<f32>),
    /// The running mean was advanced.
    Updated(Vec<f32>),
    /// Dimensions differ; the centroid must be left untouched.
    DimensionMismatch { centroid: usize, embedding: usize },
}

/// Fold `embedding` into `centroid`, which currently averages `n` members.
///
/// `c[i] = (c[i] * n + e[i]) / (n + 1)`
pub fn running_mean(centroid: Option<&[f32]>, embedding: &[f32], n: i64) -> CentroidUpdate {
    let Some(centroid) = centroid else {
        return CentroidUpdate::Initialized(embedding.to_vec());
    };
    if centroid.len() != embedding.len() {
        return CentroidUpdate::DimensionMismatch {
            centroid: centroid.len(),
            embedding: embedding.len(),
        };
    }
    let n = n.max(0) as f64;
    CentroidUpdate::Updated(
        centroid
            .iter()
            .zip(embedding.iter())
            .map(|(c, e)| ((*c as f64 * n + *e as f64) / (n + 1.0)) as f32)
            .collect(),
    )
}

/// Keeps category centroids in step with membership changes.
#[derive(Clone)]
pub struct CentroidMaintainer {
    categories: Arc<dyn CategoryRepository>,
    entries: Arc<dyn EntryRepository>,
}

impl CentroidMaintainer {
    pub fn new(categories: Arc<dyn CategoryRepository>, entries: Arc<dyn EntryRepository>) -> Self {
        Self {
            categories,
            entries,
        }
    }

    /// Fold a new member's embedding into `category`'s centroid.
    ///
    /// `category` must be the state before the member is inserted, so its
    /// `entry_count` is the `n` of the running mean. A dimension mismatch
    /// leaves the stored centroid untouched.
    pub async fn update(&self, category: &Category, embedding: &[f32]) -> Result<()> {
        if embedding.is_empty() {
            return Ok(());
        }
        match running_mean(
            category.embedding_centroid.as_deref(),
            embedding,
            category.entry_count,
        ) {
            CentroidUpdate::Initialized(c) | CentroidUpdate::Updated(c) => {
                self.categories.set_centroid(category.id, Some(c)).await?;
                debug!(
                    subsystem = "ingest",
                    component = "centroid",
                    op = "update",
                    category_id = %category.id,
                    n = category.entry_count,
                    "Centroid updated"
                );
            }
            CentroidUpdate::DimensionMismatch {
                centroid,
                embedding,
            } => {
                warn!(
                    subsystem = "ingest",
                    component = "centroid",
                    op = "update",
                    category_id = %category.id,
                    centroid_dim = centroid,
                    embedding_dim = embedding,
                    "Embedding dimension differs from centroid, centroid left unchanged"
                );
            }
        }
        Ok(())
    }

    /// Recompute the centroid from the category's current members.
    ///
    /// Members whose dimension differs from the first remaining embedding
    /// are ignored. No members clears the centroid.
    pub async fn recompute_on_removal(&self, category_id: Uuid) -> Result<()> {
        let embeddings = self.entries.embeddings_in_category(category_id).await?;
        let centroid = mean_of(&embeddings);
        debug!(
            subsystem = "ingest",
            component = "centroid",
            op = "recompute_on_removal",
            category_id = %category_id,
            record_count = embeddings.len(),
            cleared = centroid.is_none(),
            "Centroid recomputed"
        );
        self.categories.set_centroid(category_id, centroid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxnote_core::{CreateCategoryRequest, NewEntry};
    use voxnote_db::MemoryStore;

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-5, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_running_mean_initializes() {
        assert_eq!(
            running_mean(None, &[1.0, 2.0], 0),
            CentroidUpdate::Initialized(vec![1.0, 2.0])
        );
    }

    #[test]
    fn test_running_mean_formula() {
        match running_mean(Some(&[1.0, 1.0]), &[4.0, -2.0], 2) {
            CentroidUpdate::Updated(c) => assert_close(&c, &[2.0, 0.0]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_running_mean_dimension_mismatch() {
        assert_eq!(
            running_mean(Some(&[1.0, 1.0]), &[1.0, 1.0, 1.0], 1),
            CentroidUpdate::DimensionMismatch {
                centroid: 2,
                embedding: 3
            }
        );
    }

    async fn setup() -> (MemoryStore, CentroidMaintainer, Category) {
        let store = MemoryStore::new();
        let maintainer = CentroidMaintainer::new(Arc::new(store.clone()), Arc::new(store.clone()));
        let user_id = Uuid::new_v4();
        let category = CategoryRepository::insert(
            &store,
            CreateCategoryRequest {
                id: Uuid::new_v4(),
                user_id,
                name: "Work".into(),
                note_body: String::new(),
                embedding_centroid: None,
            },
        )
        .await
        .unwrap();
        (store, maintainer, category)
    }

    async fn add_member(
        store: &MemoryStore,
        maintainer: &CentroidMaintainer,
        category_id: Uuid,
        user_id: Uuid,
        embedding: Vec<f32>,
    ) -> Uuid {
        let current = CategoryRepository::get(store, user_id, category_id)
            .await
            .unwrap()
            .unwrap();
        maintainer.update(&current, &embedding).await.unwrap();
        EntryRepository::insert(
            store,
            NewEntry {
                user_id,
                transcript: "t".into(),
                title: "t".into(),
                category_id: Some(category_id),
                embedding_vector: Some(embedding),
                locale: "en".into(),
                audio_ref: None,
                is_pending: false,
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_update_then_removal_restores_previous_centroid() {
        let (store, maintainer, category) = setup().await;
        let user = category.user_id;

        for e in [vec![1.0, 0.0, 2.0], vec![0.0, 1.0, 0.5], vec![3.0, -1.0, 0.0]] {
            add_member(&store, &maintainer, category.id, user, e).await;
        }
        let before = CategoryRepository::get(&store, user, category.id)
            .await
            .unwrap()
            .unwrap()
            .embedding_centroid
            .unwrap();

        let id = add_member(&store, &maintainer, category.id, user, vec![9.0, 9.0, -9.0]).await;
        EntryRepository::delete(&store, user, id).await.unwrap();
        maintainer.recompute_on_removal(category.id).await.unwrap();

        let after = CategoryRepository::get(&store, user, category.id)
            .await
            .unwrap()
            .unwrap()
            .embedding_centroid
            .unwrap();
        assert_close(&before, &after);
    }

    #[tokio::test]
    async fn test_update_skips_mismatched_dimension() {
        let (store, maintainer, category) = setup().await;
        let user = category.user_id;
        add_member(&store, &maintainer, category.id, user, vec![1.0, 0.0]).await;

        let current = CategoryRepository::get(&store, user, category.id)
            .await
            .unwrap()
            .unwrap();
        maintainer.update(&current, &[1.0, 1.0, 1.0]).await.unwrap();

        let after = CategoryRepository::get(&store, user, category.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.embedding_centroid, Some(vec![1.0, 0.0]));
    }

    #[tokio::test]
    async fn test_removal_of_last_member_clears_centroid() {
        let (store, maintainer, category) = setup().await;
        let user = category.user_id;
        let id = add_member(&store, &maintainer, category.id, user, vec![0.5, 0.5]).await;

        EntryRepository::delete(&store, user, id).await.unwrap();
        maintainer.recompute_on_removal(category.id).await.unwrap();

        let after = CategoryRepository::get(&store, user, category.id)
            .await
            .unwrap()
            .unwrap();
        assert!(after.embedding_centroid.is_none());
    }
}
