//! Filesystem-backed audio blob storage.
//!
//! References are opaque file names (`<uuid>.<ext>`) relative to the base
//! directory. A reference that no longer resolves is reported as missing,
//! never as an error, because the retention sweep may remove blobs at any
//! time.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use voxnote_core::{new_v7, AudioBlob, AudioStore, Error, Result};

/// Audio store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FilesystemAudioStore {
    base_path: PathBuf,
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        "audio/aac" => "aac",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/webm" => "webm",
        _ => "wav",
    }
}

fn mime_for(reference: &str) -> &'static str {
    match Path::new(reference).extension().and_then(|e| e.to_str()) {
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("aac") => "audio/aac",
        Some("m4a") => "audio/mp4",
        Some("webm") => "audio/webm",
        _ => "audio/wav",
    }
}

impl FilesystemAudioStore {
    /// Create a new store with the given base directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Resolve a reference to a path inside the base directory.
    ///
    /// Rejects anything that is not a plain file name.
    fn resolve(&self, reference: &str) -> Result<PathBuf> {
        let valid = !reference.is_empty()
            && !reference.starts_with('.')
            && reference
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_');
        if !valid {
            return Err(Error::InvalidInput(format!(
                "Invalid audio reference: {}",
                reference
            )));
        }
        Ok(self.base_path.join(reference))
    }

    /// Store an audio blob and return its reference.
    pub async fn store(&self, bytes: &[u8], mime_type: &str) -> Result<String> {
        fs::create_dir_all(&self.base_path).await?;

        let reference = format!("{}.{}", new_v7(), extension_for(mime_type));
        let full_path = self.base_path.join(&reference);

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, &full_path).await?;

        debug!(
            subsystem = "db",
            component = "audio",
            op = "store",
            reference = %reference,
            size = bytes.len(),
            "Stored audio blob"
        );
        Ok(reference)
    }

    /// Remove blobs last modified before `cutoff`.
    ///
    /// Returns the number of files removed.
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut dir = match fs::read_dir(&self.base_path).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let cutoff: SystemTime = cutoff.into();
        let mut removed = 0;

        while let Some(item) = dir.next_entry().await? {
            let meta = item.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified()?;
            if modified < cutoff {
                match fs::remove_file(item.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(
                        subsystem = "db",
                        component = "audio",
                        path = %item.path().display(),
                        error = %e,
                        "Failed to remove expired audio blob"
                    ),
                }
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl AudioStore for FilesystemAudioStore {
    async fn fetch(&self, reference: &str) -> Result<Option<AudioBlob>> {
        let path = self.resolve(reference)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(AudioBlob {
                bytes,
                mime_type: mime_for(reference).to_string(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
