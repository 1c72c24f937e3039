//! Periodic audio retention sweep.
//!
//! Entries older than the retention window lose their audio reference, and
//! audio files older than the window are removed from disk. Fetching a
//! reference whose file is gone reports "no audio", so the two halves need
//! no coordination.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use voxnote_core::{Error, Result};

use crate::state::AppState;

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub cleared_refs: u64,
    pub purged_files: u64,
}

/// Run a single sweep with `now - retention` as the cutoff.
pub async fn sweep_once(
    state: &AppState,
    retention: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<SweepReport> {
    let cutoff = now - retention;
    let cleared_refs = state.entries.clear_expired_audio(cutoff).await?;
    let purged_files = match &state.audio {
        Some(store) => store.purge_older_than(cutoff).await?,
        None => 0,
    };
    Ok(SweepReport {
        cleared_refs,
        purged_files,
    })
}

/// Handle for stopping a running sweep loop.
pub struct SweepHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SweepHandle {
    /// Signal the sweep loop to stop.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))
    }
}

/// Start the sweep loop. The first sweep runs immediately.
pub fn spawn_retention_sweep(
    state: AppState,
    retention: chrono::Duration,
    interval: Duration,
) -> SweepHandle {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        info!(
            subsystem = "api",
            component = "retention",
            retention_hours = retention.num_hours(),
            interval_secs = interval.as_secs(),
            "Audio retention sweep started"
        );
        loop {
            match sweep_once(&state, retention, Utc::now()).await {
                Ok(report) if report != SweepReport::default() => info!(
                    subsystem = "api",
                    component = "retention",
                    op = "sweep",
                    cleared_refs = report.cleared_refs,
                    purged_files = report.purged_files,
                    "Expired audio removed"
                ),
                Ok(_) => debug!(
                    subsystem = "api",
                    component = "retention",
                    op = "sweep",
                    "Nothing to sweep"
                ),
                Err(e) => warn!(
                    subsystem = "api",
                    component = "retention",
                    op = "sweep",
                    error = %e,
                    "Retention sweep failed, retrying next interval"
                ),
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(subsystem = "api", component = "retention", "Audio retention sweep stopped");
                    break;
                }
                _ = sleep(interval) => {}
            }
        }
    });
    SweepHandle { shutdown_tx }
}
