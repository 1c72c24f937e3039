//! Entry repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::info;
use uuid::Uuid;

use voxnote_core::{
    new_v7, Entry, EntryRepository, Error, NewEntry, Result, UpdateEntryRequest,
};

use crate::map_insert_error;

const ENTRY_COLUMNS: &str = "id, user_id, transcript, title, category_id, embedding_vector, \
                             locale, audio_ref, created_at, updated_at, is_pending, seen_at";

pub(crate) fn entry_from_row(row: &PgRow) -> Entry {
    let embedding: Option<Vector> = row.get("embedding_vector");
    Entry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        transcript: row.get("transcript"),
        title: row.get("title"),
        category_id: row.get("category_id"),
        embedding_vector: embedding.map(|v| v.to_vec()),
        locale: row.get("locale"),
        audio_ref: row.get("audio_ref"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        is_pending: row.get("is_pending"),
        seen_at: row.get("seen_at"),
    }
}

/// PostgreSQL implementation of EntryRepository.
pub struct PgEntryRepository {
    pool: Pool<Postgres>,
}

impl PgEntryRepository {
    /// Create a new PgEntryRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// The foreign key only checks that the category exists; entries must
    /// also stay within their owner's categories.
    async fn require_owned_category(&self, user_id: Uuid, category_id: Option<Uuid>) -> Result<()> {
        let Some(id) = category_id else {
            return Ok(());
        };
        let owned: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM category WHERE id = $1 AND user_id = $2)",
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        if owned {
            Ok(())
        } else {
            Err(Error::CategoryNotFound(id))
        }
    }
}

#[async_trait]
impl EntryRepository for PgEntryRepository {
    async fn insert(&self, entry: NewEntry) -> Result<Entry> {
        self.require_owned_category(entry.user_id, entry.category_id).await?;
        let id = new_v7();
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "INSERT INTO entry (id, user_id, transcript, title, category_id, embedding_vector,
                                locale, audio_ref, created_at, updated_at, is_pending)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9, $10)
             RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(id)
        .bind(entry.user_id)
        .bind(&entry.transcript)
        .bind(&entry.title)
        .bind(entry.category_id)
        .bind(entry.embedding_vector.map(Vector::from))
        .bind(&entry.locale)
        .bind(&entry.audio_ref)
        .bind(now)
        .bind(entry.is_pending)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "entry", id))?;

        Ok(entry_from_row(&row))
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Entry>> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entry WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(entry_from_row))
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<Entry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entry WHERE user_id = $1
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(entry_from_row).collect())
    }

    async fn update(&self, user_id: Uuid, id: Uuid, req: UpdateEntryRequest) -> Result<Entry> {
        self.require_owned_category(user_id, req.category_id).await?;
        let row = sqlx::query(&format!(
            "UPDATE entry
             SET title = $3, transcript = $4, category_id = $5, is_pending = $6,
                 seen_at = $7, updated_at = now()
             WHERE id = $1 AND user_id = $2
             RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .bind(&req.title)
        .bind(&req.transcript)
        .bind(req.category_id)
        .bind(req.is_pending)
        .bind(req.seen_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref()
            .map(entry_from_row)
            .ok_or(Error::EntryNotFound(id))
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<Entry> {
        let row = sqlx::query(&format!(
            "DELETE FROM entry WHERE id = $1 AND user_id = $2 RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref()
            .map(entry_from_row)
            .ok_or(Error::EntryNotFound(id))
    }

    async fn embeddings_in_category(&self, category_id: Uuid) -> Result<Vec<Vec<f32>>> {
        let rows = sqlx::query(
            "SELECT embedding_vector FROM entry
             WHERE category_id = $1 AND embedding_vector IS NOT NULL
             ORDER BY created_at ASC",
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .iter()
            .map(|r| r.get::<Vector, _>("embedding_vector").to_vec())
            .collect())
    }

    async fn latest_titles(&self, user_id: Uuid) -> Result<Vec<(Uuid, String)>> {
        let rows = sqlx::query(
            "SELECT DISTINCT ON (category_id) category_id, title
             FROM entry
             WHERE user_id = $1 AND category_id IS NOT NULL
             ORDER BY category_id, created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .iter()
            .map(|r| (r.get("category_id"), r.get("title")))
            .collect())
    }

    async fn clear_expired_audio(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE entry SET audio_ref = NULL
             WHERE audio_ref IS NOT NULL AND created_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let cleared = result.rows_affected();
        if cleared > 0 {
            info!(
                subsystem = "db",
                component = "entries",
                op = "clear_expired_audio",
                cleared,
                cutoff = %cutoff,
                "Cleared expired audio references"
            );
        }
        Ok(cleared)
    }
}
