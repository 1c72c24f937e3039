//! Client-side sync engine.
//!
//! One engine instance runs at most one sync cycle at a time. A request made
//! while a cycle is running sets `pending_rerun`; when the running cycle ends
//! it starts a fresh push-then-pull cycle, repeating until a cycle finishes
//! with no rerun requested. Both flags live behind one mutex and change
//! together at cycle start and end.
//!
//! ```text
//! Idle --request--> Syncing --cycle done, no rerun--> Idle
//!                     ^   \
//!                     +----+ cycle done, rerun requested
//! ```
//!
//! Push order within a cycle:
//!
//! 1. pending-create categories
//! 2. pending-create entries (through remote ingestion)
//! 3. pending-update categories
//! 4. pending-update entries
//! 5. pending-delete entries, then pending-delete categories
//!
//! Each record is pushed in isolation: a failure is logged, recorded in the
//! report, and leaves the record pending for the next cycle.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use voxnote_core::defaults;
use voxnote_core::{
    CreateCategoryRequest, Error, IngestRequest, RemoteApi, Result, SyncStatus,
    UpdateCategoryRequest, UpdateEntryRequest,
};

use crate::local::{LocalStore, PullSummary};

/// Message surfaced to the user when a cycle fails for a reason other than
/// cancellation.
pub const SYNC_FAILED_MESSAGE: &str = "Sync failed, retry on next pull";

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Configuration for the sync engine and the review lifecycle.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long a move can be undone.
    pub undo_window: Duration,
    /// Deadline for each remote call made by a cycle.
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            undo_window: Duration::from_secs(defaults::UNDO_WINDOW_SECS),
            request_timeout: Duration::from_secs(defaults::REMOTE_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl SyncConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `VOXNOTE_UNDO_WINDOW_SECS` | `10` | Undo window for moves |
    /// | `VOXNOTE_REMOTE_TIMEOUT_SECS` | `30` | Per-call remote deadline |
    pub fn from_env() -> Self {
        let base = Self::default();
        let secs = |name: &str| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
        };
        Self {
            undo_window: secs("VOXNOTE_UNDO_WINDOW_SECS").unwrap_or(base.undo_window),
            request_timeout: secs("VOXNOTE_REMOTE_TIMEOUT_SECS").unwrap_or(base.request_timeout),
        }
    }

    pub fn with_undo_window(mut self, window: Duration) -> Self {
        self.undo_window = window;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

// =============================================================================
// REPORTS
// =============================================================================

/// How a sync cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed,
    /// Deliberately cancelled; not a failure.
    Cancelled,
    /// Pull failed; the transient error indicator is set.
    Failed,
}

/// Push step a record failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushStep {
    CreateCategory,
    CreateEntry,
    UpdateCategory,
    UpdateEntry,
    DeleteEntry,
    DeleteCategory,
}

/// A record that could not be pushed this cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncItemError {
    pub step: PushStep,
    pub record_id: Uuid,
    pub message: String,
}

/// Summary of one sync cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    /// Monotonic cycle number, starting at 1.
    pub cycle: u64,
    pub outcome: SyncOutcome,
    /// Records acknowledged by the remote.
    pub pushed: usize,
    pub item_errors: Vec<SyncItemError>,
    #[serde(skip)]
    pub pull: Option<PullSummary>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl SyncReport {
    fn new(cycle: u64) -> Self {
        Self {
            cycle,
            outcome: SyncOutcome::Completed,
            pushed: 0,
            item_errors: Vec::new(),
            pull: None,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.outcome == SyncOutcome::Completed && self.item_errors.is_empty()
    }
}

/// Completion handle returned by [`SyncEngine::request_sync`].
///
/// Resolves with the report of the first cycle that started after the
/// request. Dropping the ticket does not affect the sync.
pub struct SyncTicket {
    target: u64,
    reports: watch::Receiver<Option<SyncReport>>,
}

impl SyncTicket {
    /// Cycle number this ticket waits for.
    pub fn cycle(&self) -> u64 {
        self.target
    }

    pub async fn wait(mut self) -> Result<SyncReport> {
        loop {
            let ready = self
                .reports
                .borrow_and_update()
                .as_ref()
                .filter(|r| r.cycle >= self.target)
                .cloned();
            if let Some(report) = ready {
                return Ok(report);
            }
            self.reports
                .changed()
                .await
                .map_err(|_| Error::Internal("Sync engine dropped".to_string()))?;
        }
    }
}

/// Point-in-time engine status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStatus {
    pub syncing: bool,
    pub pending_rerun: bool,
    pub cycles_started: u64,
    /// Transient user-visible error, cleared by the next completed cycle.
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Flags {
    syncing: bool,
    pending_rerun: bool,
    started: u64,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Push-then-pull reconciliation between a [`LocalStore`] and a
/// [`RemoteApi`].
pub struct SyncEngine {
    local: Arc<LocalStore>,
    remote: Arc<dyn RemoteApi>,
    config: SyncConfig,
    flags: Mutex<Flags>,
    cancel: AtomicBool,
    last_error: Mutex<Option<String>>,
    reports: watch::Sender<Option<SyncReport>>,
}

impl SyncEngine {
    pub fn new(local: Arc<LocalStore>, remote: Arc<dyn RemoteApi>) -> Self {
        let (reports, _) = watch::channel(None);
        Self {
            local,
            remote,
            config: SyncConfig::default(),
            flags: Mutex::new(Flags::default()),
            cancel: AtomicBool::new(false),
            last_error: Mutex::new(None),
            reports,
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn local(&self) -> &Arc<LocalStore> {
        &self.local
    }

    /// Ask for a sync.
    ///
    /// Starts a cycle when idle; otherwise schedules exactly one rerun after
    /// the running cycle, however many requests arrive meanwhile. Must be
    /// called from within a Tokio runtime.
    pub fn request_sync(self: &Arc<Self>) -> SyncTicket {
        let reports = self.reports.subscribe();
        let (target, start) = {
            let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
            let target = flags.started + 1;
            if flags.syncing {
                flags.pending_rerun = true;
                (target, false)
            } else {
                flags.syncing = true;
                flags.started += 1;
                (target, true)
            }
        };

        if start {
            let engine = Arc::clone(self);
            tokio::spawn(async move { engine.run_loop().await });
        } else {
            debug!(
                subsystem = "sync",
                component = "engine",
                cycle = target,
                "Sync requested while syncing, rerun scheduled"
            );
        }
        SyncTicket { target, reports }
    }

    /// Abort the running cycle at the next record boundary.
    ///
    /// A cancel issued before the spawned round first runs still applies to
    /// that round. Without a running round this is a no-op.
    pub fn cancel(&self) {
        let flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        if flags.syncing {
            self.cancel.store(true, Ordering::SeqCst);
        }
    }

    pub fn status(&self) -> EngineStatus {
        let flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        EngineStatus {
            syncing: flags.syncing,
            pending_rerun: flags.pending_rerun,
            cycles_started: flags.started,
            last_error: self.last_error(),
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_report(&self) -> Option<SyncReport> {
        self.reports.borrow().clone()
    }

    /// Receive every report as cycles finish.
    pub fn subscribe(&self) -> watch::Receiver<Option<SyncReport>> {
        self.reports.subscribe()
    }

    async fn run_loop(self: Arc<Self>) {
        let mut cycle = self
            .flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .started;
        loop {
            let report = self.run_cycle(cycle).await;
            let next = {
                let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
                // Cleared here, under the flags lock, so a cancel only ever
                // targets the cycle that is current when it is issued.
                self.cancel.store(false, Ordering::SeqCst);
                if flags.pending_rerun {
                    flags.pending_rerun = false;
                    flags.started += 1;
                    Some(flags.started)
                } else {
                    flags.syncing = false;
                    None
                }
            };
            self.publish(report);

            match next {
                Some(n) => cycle = n,
                None => break,
            }
        }
    }

    /// Publish a report unless a later cycle already did.
    fn publish(&self, report: SyncReport) {
        self.reports.send_if_modified(|current| {
            if current.as_ref().is_some_and(|r| r.cycle >= report.cycle) {
                return false;
            }
            *current = Some(report);
            true
        });
    }

    async fn run_cycle(&self, cycle: u64) -> SyncReport {
        let start = Instant::now();
        let mut report = SyncReport::new(cycle);
        info!(
            subsystem = "sync",
            component = "engine",
            op = "cycle",
            cycle,
            pending = self.local.pending_count(),
            "Sync cycle started"
        );

        let result = match self.push(&mut report).await {
            Ok(()) => self.pull().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(summary) => {
                report.pull = Some(summary);
                report.outcome = SyncOutcome::Completed;
                self.set_last_error(None);
            }
            Err(e) if e.is_cancelled() => {
                report.outcome = SyncOutcome::Cancelled;
            }
            Err(e) => {
                report.outcome = SyncOutcome::Failed;
                report.error = Some(e.to_string());
                self.set_last_error(Some(SYNC_FAILED_MESSAGE.to_string()));
            }
        }
        report.duration_ms = start.elapsed().as_millis() as u64;

        match report.outcome {
            SyncOutcome::Failed => warn!(
                subsystem = "sync",
                component = "engine",
                op = "cycle",
                cycle,
                error = ?report.error,
                duration_ms = report.duration_ms,
                "Sync cycle failed"
            ),
            outcome => info!(
                subsystem = "sync",
                component = "engine",
                op = "cycle",
                cycle,
                outcome = ?outcome,
                pushed = report.pushed,
                item_errors = report.item_errors.len(),
                duration_ms = report.duration_ms,
                "Sync cycle finished"
            ),
        }
        report
    }

    fn set_last_error(&self, error: Option<String>) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.load(Ordering::SeqCst) {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn call<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} exceeded {}ms",
                what,
                self.config.request_timeout.as_millis()
            ))),
        }
    }

    /// Record an isolated item failure. Cancellation aborts the cycle.
    fn item_failed(
        &self,
        report: &mut SyncReport,
        step: PushStep,
        record_id: Uuid,
        error: Error,
    ) -> Result<()> {
        if error.is_cancelled() {
            return Err(error);
        }
        warn!(
            subsystem = "sync",
            component = "engine",
            op = "push",
            step = ?step,
            record_id = %record_id,
            error = %error,
            "Push failed, record stays pending"
        );
        report.item_errors.push(SyncItemError {
            step,
            record_id,
            message: error.to_string(),
        });
        Ok(())
    }

    async fn push(&self, report: &mut SyncReport) -> Result<()> {
        let user_id = self.local.user_id();

        for (category, revision) in self.local.pending_categories(SyncStatus::PendingCreate) {
            self.checkpoint()?;
            let req = CreateCategoryRequest {
                id: category.id,
                user_id,
                name: category.name.clone(),
                note_body: category.note_body.clone(),
                embedding_centroid: None,
            };
            match self.call("create_category", self.remote.create_category(req)).await {
                Ok(_) => {
                    self.local.mark_category_created(category.id, revision);
                    report.pushed += 1;
                }
                Err(e) if e.is_duplicate() => {
                    debug!(
                        subsystem = "sync",
                        component = "engine",
                        category_id = %category.id,
                        "Category already exists remotely, treating create as done"
                    );
                    self.local.mark_category_created(category.id, revision);
                    report.pushed += 1;
                }
                Err(e) => self.item_failed(report, PushStep::CreateCategory, category.id, e)?,
            }
        }

        for (entry, revision) in self.local.pending_entries(SyncStatus::PendingCreate) {
            self.checkpoint()?;
            let req = IngestRequest {
                user_id,
                transcript: entry.transcript.clone(),
                locale: entry.locale.clone(),
                audio_ref: entry.audio_ref.clone(),
                category_id: entry.category_id,
                client_id: Some(entry.id),
            };
            match self.call("ingest_entry", self.remote.ingest_entry(req)).await {
                Ok(server) => {
                    debug!(
                        subsystem = "sync",
                        component = "engine",
                        client_id = %entry.id,
                        entry_id = %server.id,
                        category_id = ?server.category_id,
                        "Entry ingested"
                    );
                    self.local.confirm_entry(entry.id, revision, server);
                    report.pushed += 1;
                }
                Err(e) => self.item_failed(report, PushStep::CreateEntry, entry.id, e)?,
            }
        }

        for (category, revision) in self.local.pending_categories(SyncStatus::PendingUpdate) {
            self.checkpoint()?;
            let req = UpdateCategoryRequest::from(&category);
            match self
                .call(
                    "update_category",
                    self.remote.update_category(user_id, category.id, req),
                )
                .await
            {
                Ok(_) => {
                    self.local.mark_category_synced(category.id, revision);
                    report.pushed += 1;
                }
                Err(Error::CategoryNotFound(id)) if id == category.id => {
                    self.local.remove_category(category.id);
                    report.pushed += 1;
                }
                Err(e) => self.item_failed(report, PushStep::UpdateCategory, category.id, e)?,
            }
        }

        for (entry, revision) in self.local.pending_entries(SyncStatus::PendingUpdate) {
            self.checkpoint()?;
            let req = UpdateEntryRequest::from(&entry);
            match self
                .call("update_entry", self.remote.update_entry(user_id, entry.id, req))
                .await
            {
                Ok(_) => {
                    self.local.mark_entry_synced(entry.id, revision);
                    report.pushed += 1;
                }
                Err(Error::EntryNotFound(id)) if id == entry.id => {
                    self.local.remove_entry(entry.id);
                    report.pushed += 1;
                }
                Err(e) => self.item_failed(report, PushStep::UpdateEntry, entry.id, e)?,
            }
        }

        for (entry, _) in self.local.pending_entries(SyncStatus::PendingDelete) {
            self.checkpoint()?;
            match self
                .call("delete_entry", self.remote.delete_entry(user_id, entry.id))
                .await
            {
                Ok(()) => {
                    self.local.remove_entry(entry.id);
                    report.pushed += 1;
                }
                Err(e) if e.is_not_found() => {
                    self.local.remove_entry(entry.id);
                    report.pushed += 1;
                }
                Err(e) => self.item_failed(report, PushStep::DeleteEntry, entry.id, e)?,
            }
        }

        for (category, _) in self.local.pending_categories(SyncStatus::PendingDelete) {
            self.checkpoint()?;
            match self
                .call(
                    "delete_category",
                    self.remote.delete_category(user_id, category.id),
                )
                .await
            {
                Ok(()) => {
                    self.local.remove_category(category.id);
                    report.pushed += 1;
                }
                Err(e) if e.is_not_found() => {
                    self.local.remove_category(category.id);
                    report.pushed += 1;
                }
                Err(e) => self.item_failed(report, PushStep::DeleteCategory, category.id, e)?,
            }
        }
        Ok(())
    }

    async fn pull(&self) -> Result<PullSummary> {
        self.checkpoint()?;
        let user_id = self.local.user_id();
        let categories = self
            .call("list_categories", self.remote.list_categories(user_id))
            .await?;
        self.checkpoint()?;
        let entries = self
            .call("list_entries", self.remote.list_entries(user_id))
            .await?;
        self.checkpoint()?;

        let summary = self.local.apply_pull(categories, entries);
        debug!(
            subsystem = "sync",
            component = "engine",
            op = "pull",
            upserted = summary.upserted,
            skipped_pending = summary.skipped_pending,
            removed = summary.removed,
            "Pull applied"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.undo_window, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_report_cleanliness() {
        let mut report = SyncReport::new(1);
        assert!(report.is_clean());
        report.item_errors.push(SyncItemError {
            step: PushStep::CreateEntry,
            record_id: Uuid::nil(),
            message: "offline".into(),
        });
        assert!(!report.is_clean());
    }

    #[test]
    fn test_report_serializes_outcome_snake_case() {
        let mut report = SyncReport::new(3);
        report.outcome = SyncOutcome::Cancelled;
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "cancelled");
        assert_eq!(json["cycle"], 3);
    }
}
