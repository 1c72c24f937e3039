//! Category resolution.
//!
//! Decides which category a classified transcript belongs to. Tiers run in
//! a fixed order and the first one that selects a category wins:
//!
//! | Tier | Selects |
//! |------|---------|
//! | explicit | fuzzy match on the stated name, no similarity fallback |
//! | fuzzy | exact, containment, then edit-distance name match |
//! | similarity | best centroid above the configured threshold |
//! | cap | closest centroid at any similarity once the cap is reached |
//! | new | a fresh category |
//!
//! Selecting an existing category folds the entry's embedding into its
//! centroid before the entry is written. A new category starts with the
//! embedding as its centroid.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use voxnote_core::defaults::{FORCE_ASSIGN_THRESHOLD, MAX_CATEGORIES};
use voxnote_core::{
    new_v7, Category, CategoryRepository, ClassificationResult, CreateCategoryRequest,
    Resolution, Result,
};

use crate::centroid::CentroidMaintainer;
use crate::fuzzy::{self, FuzzyTier};

/// Tier that produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    Explicit(FuzzyTier),
    Fuzzy(FuzzyTier),
    Similarity,
    Cap,
    CapFallback,
    New,
}

impl ResolutionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit(_) => "explicit",
            Self::Fuzzy(_) => "fuzzy",
            Self::Similarity => "similarity",
            Self::Cap => "cap",
            Self::CapFallback => "cap_fallback",
            Self::New => "new",
        }
    }
}

/// A resolution together with the tier that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCategory {
    pub resolution: Resolution,
    pub tier: ResolutionTier,
    pub name: String,
}

/// Multi-tier category resolver.
#[derive(Clone)]
pub struct CategoryResolver {
    categories: Arc<dyn CategoryRepository>,
    centroids: CentroidMaintainer,
    max_categories: usize,
}

impl CategoryResolver {
    pub fn new(categories: Arc<dyn CategoryRepository>, centroids: CentroidMaintainer) -> Self {
        Self {
            categories,
            centroids,
            max_categories: MAX_CATEGORIES,
        }
    }

    /// Set the maximum number of non-archived categories per user.
    pub fn with_max_categories(mut self, max: usize) -> Self {
        self.max_categories = max.max(1);
        self
    }

    pub fn max_categories(&self) -> usize {
        self.max_categories
    }

    /// Resolve a classification to a category id.
    ///
    /// `existing` must be the user's non-archived categories ordered by
    /// descending entry count. Callers serialize resolution per user.
    pub async fn resolve(
        &self,
        user_id: Uuid,
        classification: &ClassificationResult,
        existing: &[Category],
        embedding: &[f32],
        threshold: f32,
    ) -> Result<ResolvedCategory> {
        let names: Vec<&str> = existing.iter().map(|c| c.name.as_str()).collect();

        if classification.is_explicit_placement {
            if let Some(m) = fuzzy::find_match(&classification.category_name, &names) {
                return self
                    .select(&existing[m.index], embedding, ResolutionTier::Explicit(m.tier), None)
                    .await;
            }
            return self
                .create_or_cap(user_id, existing, embedding, classification.category_name.trim())
                .await;
        }

        if let Some(m) = fuzzy::find_match(&classification.category_name, &names) {
            return self
                .select(&existing[m.index], embedding, ResolutionTier::Fuzzy(m.tier), None)
                .await;
        }

        if !existing.is_empty() {
            if let Some((category, similarity)) = self
                .closest(user_id, existing, embedding, threshold)
                .await
            {
                return self
                    .select(category, embedding, ResolutionTier::Similarity, Some(similarity))
                    .await;
            }
        }

        let name = classification
            .suggested_new_category
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| classification.category_name.trim());
        self.create_or_cap(user_id, existing, embedding, name).await
    }

    /// Cap check followed by category creation.
    async fn create_or_cap(
        &self,
        user_id: Uuid,
        existing: &[Category],
        embedding: &[f32],
        name: &str,
    ) -> Result<ResolvedCategory> {
        if existing.len() >= self.max_categories {
            if let Some((category, similarity)) = self
                .closest(user_id, existing, embedding, FORCE_ASSIGN_THRESHOLD)
                .await
            {
                return self
                    .select(category, embedding, ResolutionTier::Cap, Some(similarity))
                    .await;
            }
            if let Some(largest) = existing.first() {
                warn!(
                    subsystem = "ingest",
                    component = "resolver",
                    user_id = %user_id,
                    category_id = %largest.id,
                    "No comparable centroid at category cap, using largest category"
                );
                return self
                    .select(largest, embedding, ResolutionTier::CapFallback, None)
                    .await;
            }
        }
        self.create(user_id, name, embedding).await
    }

    /// Similarity query restricted to the pre-fetched category set.
    ///
    /// Store errors degrade to "no match".
    async fn closest<'a>(
        &self,
        user_id: Uuid,
        existing: &'a [Category],
        embedding: &[f32],
        threshold: f32,
    ) -> Option<(&'a Category, f32)> {
        if embedding.is_empty() {
            return None;
        }
        let found = match self
            .categories
            .match_category(user_id, embedding, threshold)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    subsystem = "ingest",
                    component = "resolver",
                    user_id = %user_id,
                    error = %e,
                    "Similarity query failed, treating as no match"
                );
                return None;
            }
        };
        let found = found?;
        debug!(
            subsystem = "ingest",
            component = "resolver",
            category_id = %found.category_id,
            similarity = found.similarity,
            threshold,
            "Similarity candidate"
        );
        existing
            .iter()
            .find(|c| c.id == found.category_id)
            .map(|c| (c, found.similarity))
    }

    async fn select(
        &self,
        category: &Category,
        embedding: &[f32],
        tier: ResolutionTier,
        similarity: Option<f32>,
    ) -> Result<ResolvedCategory> {
        self.centroids.update(category, embedding).await?;
        debug!(
            subsystem = "ingest",
            component = "resolver",
            op = "resolve",
            tier = tier.as_str(),
            category_id = %category.id,
            similarity = ?similarity,
            "Resolved to existing category"
        );
        Ok(ResolvedCategory {
            resolution: Resolution {
                category_id: category.id,
                is_new: false,
            },
            tier,
            name: category.name.clone(),
        })
    }

    async fn create(&self, user_id: Uuid, name: &str, embedding: &[f32]) -> Result<ResolvedCategory> {
        let centroid = (!embedding.is_empty()).then(|| embedding.to_vec());
        let category = self
            .categories
            .insert(CreateCategoryRequest {
                id: new_v7(),
                user_id,
                name: name.to_string(),
                note_body: String::new(),
                embedding_centroid: centroid,
            })
            .await?;
        info!(
            subsystem = "ingest",
            component = "resolver",
            op = "resolve",
            tier = ResolutionTier::New.as_str(),
            user_id = %user_id,
            category_id = %category.id,
            name = %category.name,
            "Created category"
        );
        Ok(ResolvedCategory {
            resolution: Resolution {
                category_id: category.id,
                is_new: true,
            },
            tier: ResolutionTier::New,
            name: category.name,
        })
    }
}
