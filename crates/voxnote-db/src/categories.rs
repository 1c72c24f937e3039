//! Category repository implementation.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use voxnote_core::{
    Category, CategoryMatch, CategoryRepository, CreateCategoryRequest, Error, Result,
    UpdateCategoryRequest,
};

use crate::map_insert_error;

const CATEGORY_COLUMNS: &str = "id, user_id, name, entry_count, embedding_centroid, note_body, \
                                is_archived, created_at, last_updated";

pub(crate) fn category_from_row(row: &PgRow) -> Category {
    let centroid: Option<Vector> = row.get("embedding_centroid");
    Category {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        entry_count: row.get("entry_count"),
        embedding_centroid: centroid.map(|v| v.to_vec()),
        note_body: row.get("note_body"),
        is_archived: row.get("is_archived"),
        created_at: row.get("created_at"),
        last_updated: row.get("last_updated"),
    }
}

/// PostgreSQL implementation of CategoryRepository.
pub struct PgCategoryRepository {
    pool: Pool<Postgres>,
}

impl PgCategoryRepository {
    /// Create a new PgCategoryRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CategoryRepository for PgCategoryRepository {
    async fn insert(&self, req: CreateCategoryRequest) -> Result<Category> {
        let row = sqlx::query(&format!(
            "INSERT INTO category (id, user_id, name, note_body, embedding_centroid)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(req.id)
        .bind(req.user_id)
        .bind(&req.name)
        .bind(&req.note_body)
        .bind(req.embedding_centroid.map(Vector::from))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "category", req.id))?;

        Ok(category_from_row(&row))
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Category>> {
        let row = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM category WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(category_from_row))
    }

    async fn list_active(&self, user_id: Uuid) -> Result<Vec<Category>> {
        let rows = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM category
             WHERE user_id = $1 AND NOT is_archived
             ORDER BY entry_count DESC, created_at ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(category_from_row).collect())
    }

    async fn list_recent(&self, user_id: Uuid) -> Result<Vec<Category>> {
        let rows = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM category
             WHERE user_id = $1 AND NOT is_archived
             ORDER BY last_updated DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(category_from_row).collect())
    }

    async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        req: UpdateCategoryRequest,
    ) -> Result<Category> {
        let row = sqlx::query(&format!(
            "UPDATE category
             SET name = $3, note_body = $4, is_archived = $5, last_updated = now()
             WHERE id = $1 AND user_id = $2
             RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .bind(&req.name)
        .bind(&req.note_body)
        .bind(req.is_archived)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref()
            .map(category_from_row)
            .ok_or(Error::CategoryNotFound(id))
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        // Member entries fall back to the inbox through ON DELETE SET NULL.
        let result = sqlx::query("DELETE FROM category WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::CategoryNotFound(id));
        }
        Ok(())
    }

    async fn set_centroid(&self, id: Uuid, centroid: Option<Vec<f32>>) -> Result<()> {
        sqlx::query(
            "UPDATE category SET embedding_centroid = $2, last_updated = now() WHERE id = $1",
        )
        .bind(id)
        .bind(centroid.map(Vector::from))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn match_category(
        &self,
        user_id: Uuid,
        query: &[f32],
        threshold: f32,
    ) -> Result<Option<CategoryMatch>> {
        if query.is_empty() {
            return Ok(None);
        }
        let query_vec = Vector::from(query.to_vec());

        // Centroids of another dimension cannot be compared; zero-magnitude
        // vectors yield NaN and are dropped as well.
        let row = sqlx::query(
            r#"
            SELECT id, name, similarity FROM (
                SELECT c.id, c.name, c.entry_count, c.created_at,
                       1.0 - (c.embedding_centroid <=> $2::vector) AS similarity
                FROM category c
                WHERE c.user_id = $1
                  AND NOT c.is_archived
                  AND c.embedding_centroid IS NOT NULL
                  AND vector_dims(c.embedding_centroid) = vector_dims($2::vector)
            ) scored
            WHERE similarity <> 'NaN'::float8 AND similarity > $3
            ORDER BY similarity DESC, entry_count DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(query_vec)
        .bind(threshold as f64)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let found = row.map(|r| CategoryMatch {
            category_id: r.get("id"),
            name: r.get("name"),
            similarity: r.get::<f64, _>("similarity") as f32,
        });

        debug!(
            subsystem = "db",
            component = "categories",
            op = "match_category",
            user_id = %user_id,
            threshold,
            matched = found.is_some(),
            "Similarity query"
        );
        Ok(found)
    }
}
