//! Centralized default constants for voxnote.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers; environment overrides are applied by the `from_env()` config
//! constructors of each crate.

// =============================================================================
// CATEGORY RESOLUTION
// =============================================================================

/// Maximum number of non-archived categories per user.
///
/// Once reached, the resolver force-assigns instead of creating a new one.
pub const MAX_CATEGORIES: usize = 10;

/// Similarity threshold for ingestion of device transcripts.
pub const TEXT_SIMILARITY_THRESHOLD: f32 = 0.60;

/// Similarity threshold for ingestion of re-transcribed audio.
pub const AUDIO_SIMILARITY_THRESHOLD: f32 = 0.55;

/// Threshold used for the cap force-assign query ("closest, whatever it is").
pub const FORCE_ASSIGN_THRESHOLD: f32 = 0.0;

/// Maximum Levenshtein distance for the edit-distance fuzzy tier.
pub const FUZZY_MAX_EDIT_DISTANCE: usize = 2;

/// Edit distance must stay below this share of the longer name's length.
pub const FUZZY_MAX_EDIT_RATIO: f64 = 0.30;

// =============================================================================
// INGESTION
// =============================================================================

/// Maximum accepted transcript length in characters.
pub const MAX_TRANSCRIPT_CHARS: usize = 10_000;

/// Timeout for classification requests in seconds.
pub const CLASSIFY_TIMEOUT_SECS: u64 = 20;

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 10;

/// Timeout for audio transcription requests in seconds.
pub const TRANSCRIBE_TIMEOUT_SECS: u64 = 60;

/// Locale used when a request does not carry one.
pub const DEFAULT_LOCALE: &str = "en";

/// Title used when the title generator returns nothing usable.
pub const FALLBACK_TITLE: &str = "Untitled";

/// Maximum title length in characters.
pub const MAX_TITLE_CHARS: usize = 80;

// =============================================================================
// INFERENCE
// =============================================================================

/// Environment variable for the OpenAI-compatible base URL.
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";

/// Environment variable for the API key.
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Environment variable for the embedding model.
pub const ENV_OPENAI_EMBED_MODEL: &str = "OPENAI_EMBED_MODEL";

/// Environment variable for the classification model.
pub const ENV_OPENAI_GEN_MODEL: &str = "OPENAI_GEN_MODEL";

/// Environment variable for the embedding dimension.
pub const ENV_OPENAI_EMBED_DIM: &str = "OPENAI_EMBED_DIM";

/// Environment variable for the HTTP timeout in seconds.
pub const ENV_OPENAI_TIMEOUT: &str = "OPENAI_TIMEOUT";

/// Default OpenAI API base URL.
pub const OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default embedding model.
pub const EMBED_MODEL: &str = "text-embedding-3-small";

/// Default embedding vector dimension for text-embedding-3-small.
pub const EMBED_DIMENSION: usize = 1536;

/// Default classification model.
pub const GEN_MODEL: &str = "gpt-4o-mini";

/// Default HTTP timeout for inference calls in seconds.
pub const OPENAI_TIMEOUT_SECS: u64 = 60;

/// Environment variable for the Whisper transcription server URL.
pub const ENV_WHISPER_BASE_URL: &str = "WHISPER_BASE_URL";

/// Default Whisper transcription server URL.
pub const DEFAULT_WHISPER_BASE_URL: &str = "http://localhost:8000";

/// Environment variable for the Whisper model name.
pub const ENV_WHISPER_MODEL: &str = "WHISPER_MODEL";

/// Default Whisper model.
pub const DEFAULT_WHISPER_MODEL: &str = "whisper-1";

// =============================================================================
// SYNC
// =============================================================================

/// How long a Move can be undone, in seconds.
pub const UNDO_WINDOW_SECS: u64 = 10;

/// Timeout for a single remote call made by the sync client, in seconds.
pub const REMOTE_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Separator placed between a merged transcript and the existing note body.
pub const NOTE_SEPARATOR: &str = "\n\n";

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default bind address.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Audio references older than this are cleared by the retention sweep.
pub const AUDIO_RETENTION_HOURS: i64 = 24;

/// Interval between retention sweeps in seconds.
pub const AUDIO_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Default directory for uploaded audio blobs.
pub const AUDIO_STORAGE_PATH: &str = "/var/lib/voxnote/audio";

// =============================================================================
// DATABASE POOL
// =============================================================================

/// Maximum number of pooled PostgreSQL connections.
pub const POOL_MAX_CONNECTIONS: u32 = 10;

/// Minimum number of idle connections kept open.
pub const POOL_MIN_CONNECTIONS: u32 = 1;

/// Connection acquire timeout in seconds.
pub const POOL_ACQUIRE_TIMEOUT_SECS: u64 = 30;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_threshold_is_looser_than_text() {
        assert!(AUDIO_SIMILARITY_THRESHOLD < TEXT_SIMILARITY_THRESHOLD);
    }

    #[test]
    fn test_force_assign_accepts_anything_positive() {
        assert!(FORCE_ASSIGN_THRESHOLD < AUDIO_SIMILARITY_THRESHOLD);
        assert_eq!(FORCE_ASSIGN_THRESHOLD, 0.0);
    }

    #[test]
    fn test_pool_bounds() {
        assert!(POOL_MIN_CONNECTIONS <= POOL_MAX_CONNECTIONS);
    }
}
