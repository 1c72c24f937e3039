//! Error types for voxnote.

use thiserror::Error;

/// Result type alias using voxnote's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for voxnote operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Category not found
    #[error("Category not found: {0}")]
    CategoryNotFound(uuid::Uuid),

    /// Entry not found
    #[error("Entry not found: {0}")]
    EntryNotFound(uuid::Uuid),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Classification call failed or returned malformed output
    #[error("Classification error: {0}")]
    Classification(String),

    /// Audio re-transcription failed
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// An external call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Neither the device transcript nor the audio produced any text
    #[error("No speech detected")]
    NoSpeech,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Record already exists (duplicate create)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation was cancelled deliberately (not a failure)
    #[error("Cancelled")]
    Cancelled,

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error reports a record that already exists remotely.
    ///
    /// Unique-constraint violations from PostgreSQL are recognised as well,
    /// so a raw database error reaching the sync engine still degrades to
    /// success.
    pub fn is_duplicate(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::Database(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref() == Some("23505")
            }
            Error::Request(msg) => msg.contains("duplicate"),
            _ => false,
        }
    }

    /// Whether this error represents deliberate cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Whether this error means the addressed record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::CategoryNotFound(_) | Error::EntryNotFound(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Request(e.to_string())
        }
    }
}
