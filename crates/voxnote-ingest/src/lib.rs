//! # voxnote-ingest
//!
//! Category resolution and ingestion for voxnote.
//!
//! This crate provides:
//! - Fuzzy category-name matching
//! - Centroid maintenance for category embeddings
//! - The multi-tier category resolver
//! - The ingestion pipeline (manual and AI paths)
//! - An in-process implementation of the remote API
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voxnote_ingest::{IngestConfig, IngestionPipeline, IngestService};
//!
//! let pipeline = IngestionPipeline::new(categories.clone(), entries.clone(), classifier, embedder)
//!     .with_config(IngestConfig::from_env());
//! let service = IngestService::new(categories, entries, Arc::new(pipeline));
//! let entry = service.ingest_entry(request).await?;
//! ```

pub mod centroid;
pub mod fuzzy;
pub mod pipeline;
pub mod resolver;
pub mod service;

pub use centroid::{running_mean, CentroidMaintainer, CentroidUpdate};
pub use fuzzy::{find_match, normalize_name, FuzzyMatch, FuzzyTier};
pub use pipeline::{IngestConfig, IngestionPipeline, TranscriptSource, UserLocks};
pub use resolver::{CategoryResolver, ResolutionTier, ResolvedCategory};
pub use service::IngestService;
