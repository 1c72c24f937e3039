//! Category handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use voxnote_core::{Category, CreateCategoryRequest, RemoteApi, UpdateCategoryRequest};

use crate::error::ApiError;
use crate::state::{AppState, UserId};

/// Non-archived categories of the user, most recently updated first.
pub async fn list_categories(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.service.list_categories(user_id).await?))
}

/// Create a category with a client-chosen id.
///
/// # Returns
/// - 201 Created with the category
/// - 409 Conflict if the id already exists
pub async fn create_category(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(mut req): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    req.user_id = user_id;
    let category = state.service.create_category(req).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn get_category(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.service.get_category(user_id, id).await?))
}

/// Rename, rewrite the note of, or archive a category.
pub async fn update_category(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCategoryRequest>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.service.update_category(user_id, id, req).await?))
}

/// Delete a category; its entries move to the inbox.
pub async fn delete_category(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_category(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
