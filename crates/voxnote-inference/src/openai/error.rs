//! OpenAI-specific error handling.

use voxnote_core::Error;

/// OpenAI-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    /// Invalid authentication credentials.
    AuthenticationError,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Model not found or not available.
    ModelNotFound,
    /// Request too large.
    ContextLengthExceeded,
    /// Server error.
    ServerError,
    /// Unknown error.
    Unknown,
}

impl OpenAIErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401, _) => Self::AuthenticationError,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

/// Which call failed; decides the error variant callers see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Embedding,
    Generation,
}

impl CallKind {
    fn wrap(self, message: String) -> Error {
        match self {
            CallKind::Embedding => Error::Embedding(message),
            CallKind::Generation => Error::Classification(message),
        }
    }
}

/// Convert an OpenAI error response to a voxnote Error.
///
/// Credential and model problems are configuration errors; everything else
/// is reported against the call that failed.
pub fn to_voxnote_error(kind: CallKind, code: OpenAIErrorCode, message: &str) -> Error {
    match code {
        OpenAIErrorCode::AuthenticationError => {
            Error::Config(format!("Authentication failed: {}", message))
        }
        OpenAIErrorCode::ModelNotFound => Error::Config(format!("Model not found: {}", message)),
        OpenAIErrorCode::RateLimitExceeded => {
            kind.wrap(format!("Rate limit exceeded: {}", message))
        }
        OpenAIErrorCode::ContextLengthExceeded => {
            kind.wrap(format!("Context too long: {}", message))
        }
        OpenAIErrorCode::ServerError => kind.wrap(format!("Server error: {}", message)),
        OpenAIErrorCode::Unknown => kind.wrap(message.to_string()),
    }
}

/// Convert a transport failure, keeping timeouts distinguishable.
pub fn from_transport(kind: CallKind, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("{:?} request: {}", kind, e))
    } else {
        kind.wrap(format!("Request failed: {}", e))
    }
}
