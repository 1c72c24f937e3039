//! Shared application state.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use voxnote_core::EntryRepository;
use voxnote_db::FilesystemAudioStore;
use voxnote_ingest::IngestService;

use crate::error::ApiError;

/// Header carrying the acting user.
pub const USER_HEADER: &str = "x-user-id";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: IngestService,
    /// Needed directly by the retention sweep.
    pub entries: Arc<dyn EntryRepository>,
    /// Audio uploads are rejected when unset.
    pub audio: Option<FilesystemAudioStore>,
}

impl AppState {
    pub fn new(service: IngestService, entries: Arc<dyn EntryRepository>) -> Self {
        Self {
            service,
            entries,
            audio: None,
        }
    }

    pub fn with_audio(mut self, audio: FilesystemAudioStore) -> Self {
        self.audio = Some(audio);
        self
    }
}

/// Acting user taken from the `X-User-Id` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| ApiError::BadRequest("X-User-Id header is required".into()))?
            .to_str()
            .map_err(|_| ApiError::BadRequest("X-User-Id header is not valid text".into()))?;
        Uuid::parse_str(raw.trim())
            .map(UserId)
            .map_err(|_| ApiError::BadRequest("X-User-Id header is not a UUID".into()))
    }
}
