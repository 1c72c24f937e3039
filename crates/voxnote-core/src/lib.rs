//! # voxnote-core
//!
//! Core types, traits, and abstractions for voxnote.
//!
//! This crate provides the domain model (categories, entries, sync status,
//! classification results), the shared error type, and the trait seams that
//! the inference backends, the remote store, and the sync client plug into.

pub mod defaults;
pub mod error;
pub mod models;
pub mod traits;
pub mod vector;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
pub use vector::{cosine_similarity, mean_of, same_dimension};

/// Generate a new time-ordered UUIDv7 identifier.
pub fn new_v7() -> uuid::Uuid {
    uuid::Uuid::now_v7()
}
