//! Entry handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use voxnote_core::{Entry, IngestRequest, RemoteApi, UpdateEntryRequest};

use crate::error::ApiError;
use crate::state::{AppState, UserId};

pub async fn list_entries(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<Entry>>, ApiError> {
    Ok(Json(state.service.list_entries(user_id).await?))
}

/// Ingest a transcript.
///
/// With `category_id` set the manual path files the entry directly;
/// otherwise the entry is classified and arrives pending review.
///
/// # Returns
/// - 201 Created with the stored entry
/// - 400 Bad Request for an empty or oversized transcript
/// - 404 Not Found for an unknown manual category
/// - 422 Unprocessable Entity when no speech was found
/// - 504 Gateway Timeout when classification or embedding timed out
pub async fn ingest_entry(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(mut req): Json<IngestRequest>,
) -> Result<(StatusCode, Json<Entry>), ApiError> {
    req.user_id = user_id;
    let entry = state.service.ingest_entry(req).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn get_entry(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<Entry>, ApiError> {
    Ok(Json(state.service.get_entry(user_id, id).await?))
}

/// Full-state update; a changed `category_id` moves the entry.
pub async fn update_entry(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateEntryRequest>,
) -> Result<Json<Entry>, ApiError> {
    Ok(Json(state.service.update_entry(user_id, id, req).await?))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_entry(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
