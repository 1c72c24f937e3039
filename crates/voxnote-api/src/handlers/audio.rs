//! Audio upload handler.
//!
//! Clients upload the recording first and pass the returned reference as
//! `audio_ref` when ingesting, so the server can re-transcribe it.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::info;

use crate::error::ApiError;
use crate::state::{AppState, UserId};

#[derive(Debug, Serialize)]
pub struct UploadAudioResponse {
    pub audio_ref: String,
    pub size: usize,
}

/// Store an uploaded recording.
///
/// # Multipart Fields
/// - `file`: audio file (required)
///
/// # Returns
/// - 201 Created with the audio reference
/// - 400 Bad Request if the file is missing or empty
/// - 503 Service Unavailable if `AUDIO_STORAGE_PATH` is not configured
pub async fn upload_audio(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadAudioResponse>), ApiError> {
    let store = state.audio.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable(
            "Audio storage not configured. Set AUDIO_STORAGE_PATH environment variable.".into(),
        )
    })?;

    let mut upload: Option<(Vec<u8>, String)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            let mime = field
                .content_type()
                .unwrap_or("audio/wav")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?;
            upload = Some((bytes.to_vec(), mime));
        }
    }

    let (bytes, mime) = upload
        .filter(|(b, _)| !b.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing or empty 'file' field".into()))?;
    let audio_ref = store.store(&bytes, &mime).await?;

    info!(
        subsystem = "api",
        component = "audio",
        op = "upload",
        user_id = %user_id,
        audio_ref = %audio_ref,
        size = bytes.len(),
        "Audio uploaded"
    );
    Ok((
        StatusCode::CREATED,
        Json(UploadAudioResponse {
            audio_ref,
            size: bytes.len(),
        }),
    ))
}
