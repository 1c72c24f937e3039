//! # voxnote-sync
//!
//! Offline-first client state for voxnote.
//!
//! This crate provides:
//! - [`LocalStore`]: the local mirror with per-record sync status
//! - [`SyncEngine`]: coalesced push-then-pull reconciliation against a [`RemoteApi`]
//! - [`HttpRemoteApi`]: the remote API over HTTP
//! - [`PendingEntryLifecycle`]: review of AI-placed entries (keep, move, undo)
//! - [`AppContext`]: derived display state
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voxnote_sync::{HttpRemoteApi, HttpRemoteConfig, LocalStore, SyncEngine};
//!
//! let config = HttpRemoteConfig::from_env()?;
//! let local = Arc::new(LocalStore::new(config.require_user_id()?));
//! let engine = Arc::new(SyncEngine::new(local.clone(), Arc::new(HttpRemoteApi::new(config))));
//!
//! local.add_entry("book flights to Rome", "en", None, None)?;
//! let report = engine.request_sync().wait().await?;
//! ```
//!
//! [`RemoteApi`]: voxnote_core::RemoteApi

pub mod context;
pub mod engine;
pub mod http;
pub mod local;
pub mod pending;

pub use context::{AppContext, CategorySummary, SyncIndicator};
pub use engine::{
    EngineStatus, PushStep, SyncConfig, SyncEngine, SyncItemError, SyncOutcome, SyncReport,
    SyncTicket, SYNC_FAILED_MESSAGE,
};
pub use http::{error_from_status, ErrorBody, HttpRemoteApi, HttpRemoteConfig, USER_HEADER};
pub use local::{LocalState, LocalStore, PullSummary, Tracked};
pub use pending::{prepend_to_note, MoveTarget, OpenedCategory, PendingEntryLifecycle, UndoMove};
