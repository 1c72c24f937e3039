//! Server side of the remote CRUD surface.
//!
//! [`IngestService`] implements [`RemoteApi`] directly on the repositories,
//! routing entry creation through the ingestion pipeline and keeping
//! centroids current when entries leave or change category.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use voxnote_core::{
    Category, CategoryRepository, CreateCategoryRequest, Entry, EntryRepository, Error,
    IngestRequest, RemoteApi, Result, UpdateCategoryRequest, UpdateEntryRequest,
};

use crate::pipeline::IngestionPipeline;

/// In-process implementation of the remote API.
#[derive(Clone)]
pub struct IngestService {
    categories: Arc<dyn CategoryRepository>,
    entries: Arc<dyn EntryRepository>,
    pipeline: Arc<IngestionPipeline>,
}

impl IngestService {
    pub fn new(
        categories: Arc<dyn CategoryRepository>,
        entries: Arc<dyn EntryRepository>,
        pipeline: Arc<IngestionPipeline>,
    ) -> Self {
        Self {
            categories,
            entries,
            pipeline,
        }
    }

    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.pipeline
    }

    pub async fn get_category(&self, user_id: Uuid, id: Uuid) -> Result<Category> {
        self.categories
            .get(user_id, id)
            .await?
            .ok_or(Error::CategoryNotFound(id))
    }

    pub async fn get_entry(&self, user_id: Uuid, id: Uuid) -> Result<Entry> {
        self.entries
            .get(user_id, id)
            .await?
            .ok_or(Error::EntryNotFound(id))
    }
}

#[async_trait]
impl RemoteApi for IngestService {
    async fn create_category(&self, req: CreateCategoryRequest) -> Result<Category> {
        if req.name.trim().is_empty() {
            return Err(Error::InvalidInput("Category name is empty".to_string()));
        }
        let category = self.categories.insert(req).await?;
        info!(
            subsystem = "ingest",
            component = "service",
            op = "create_category",
            user_id = %category.user_id,
            category_id = %category.id,
            "Category created"
        );
        Ok(category)
    }

    async fn update_category(
        &self,
        user_id: Uuid,
        id: Uuid,
        req: UpdateCategoryRequest,
    ) -> Result<Category> {
        if req.name.trim().is_empty() {
            return Err(Error::InvalidInput("Category name is empty".to_string()));
        }
        self.categories.update(user_id, id, req).await
    }

    async fn delete_category(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        self.categories.delete(user_id, id).await?;
        info!(
            subsystem = "ingest",
            component = "service",
            op = "delete_category",
            user_id = %user_id,
            category_id = %id,
            "Category deleted"
        );
        Ok(())
    }

    async fn list_categories(&self, user_id: Uuid) -> Result<Vec<Category>> {
        self.categories.list_recent(user_id).await
    }

    async fn ingest_entry(&self, req: IngestRequest) -> Result<Entry> {
        self.pipeline.ingest(req).await
    }

    async fn update_entry(
        &self,
        user_id: Uuid,
        id: Uuid,
        req: UpdateEntryRequest,
    ) -> Result<Entry> {
        let _guard = self.pipeline.lock_user(user_id).await;
        let before = self.get_entry(user_id, id).await?;
        if before.category_id == req.category_id {
            return self.entries.update(user_id, id, req).await;
        }

        let destination = match req.category_id {
            Some(cid) => Some(self.get_category(user_id, cid).await?),
            None => None,
        };
        let updated = self.entries.update(user_id, id, req).await?;

        let centroids = self.pipeline.centroids();
        if let Some(source) = before.category_id {
            centroids.recompute_on_removal(source).await?;
        }
        if let (Some(destination), Some(embedding)) = (&destination, &before.embedding_vector) {
            centroids.update(destination, embedding).await?;
        }
        info!(
            subsystem = "ingest",
            component = "service",
            op = "move_entry",
            user_id = %user_id,
            entry_id = %id,
            from = ?before.category_id,
            to = ?updated.category_id,
            "Entry moved"
        );
        Ok(updated)
    }

    async fn delete_entry(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        let _guard = self.pipeline.lock_user(user_id).await;
        let removed = self.entries.delete(user_id, id).await?;
        if let Some(category_id) = removed.category_id {
            self.pipeline
                .centroids()
                .recompute_on_removal(category_id)
                .await?;
        }
        Ok(())
    }

    async fn list_entries(&self, user_id: Uuid) -> Result<Vec<Entry>> {
        self.entries.list(user_id).await
    }
}
