//! Waiting for a submitted job's images to land.
//!
//! There is no completion signal from the server; the archiver is run at a
//! fixed interval until it moves something, the poll budget runs out, or
//! the [`CancellationToken`] fires.

use std::time::Duration;

use aigc_core::archive::{ArchiveFilter, AssetArchiver};
use aigc_core::config::{PipelineConfig, DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL};
use tokio_util::sync::CancellationToken;

/// Tunable parameters for output polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Pause before each archive pass.
    pub interval: Duration,
    /// Number of archive passes before giving up.
    pub max_polls: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

impl From<&PipelineConfig> for PollConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            interval: config.poll_interval,
            max_polls: config.max_polls,
        }
    }
}

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// At least one file was archived.
    Archived(usize),
    /// The poll budget ran out with nothing archived.
    TimedOut,
    /// Cancelled before anything was archived.
    Cancelled,
}

impl WaitOutcome {
    pub fn moved(self) -> usize {
        match self {
            Self::Archived(n) => n,
            Self::TimedOut | Self::Cancelled => 0,
        }
    }
}

/// Poll `archiver` until it moves at least one matching file.
pub async fn wait_for_assets(
    archiver: &AssetArchiver,
    window: Duration,
    filter: &ArchiveFilter,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> WaitOutcome {
    for attempt in 1..=config.max_polls {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(attempt, "Output wait cancelled");
                return WaitOutcome::Cancelled;
            }
            _ = tokio::time::sleep(config.interval) => {}
        }

        // Directory scan and moves are blocking filesystem work.
        let pass_archiver = archiver.clone();
        let pass_filter = filter.clone();
        let moved = match tokio::task::spawn_blocking(move || {
            pass_archiver.sync_matching(window, &pass_filter)
        })
        .await
        {
            Ok(moved) => moved,
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Archive pass task failed");
                0
            }
        };
        if moved > 0 {
            tracing::debug!(attempt, moved, "Outputs archived");
            return WaitOutcome::Archived(moved);
        }

        tracing::debug!(
            attempt,
            max_polls = config.max_polls,
            "No new outputs yet",
        );
    }

    tracing::warn!(
        max_polls = config.max_polls,
        interval_ms = config.interval.as_millis() as u64,
        "Gave up waiting for outputs",
    );
    WaitOutcome::TimedOut
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
