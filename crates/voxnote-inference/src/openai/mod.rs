//! OpenAI-compatible inference backend.
//!
//! Works with any endpoint speaking the OpenAI embeddings and chat
//! completions API (OpenAI itself, vLLM, LocalAI, Ollama in compatibility
//! mode).
//!
//! # Example
//!
//! ```rust,no_run
//! use voxnote_inference::openai::OpenAIBackend;
//! use voxnote_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::from_env().unwrap();
//!     let vector = backend.embed_one("pick up the dry cleaning").await.unwrap();
//!     assert_eq!(vector.len(), backend.dimension());
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{OpenAIBackend, OpenAIConfig};
pub use error::{to_voxnote_error, CallKind, OpenAIErrorCode};
pub use types::*;
