//! Append-only job history log.
//!
//! One CSV row per job attempt. The header is written when the file is
//! created (or found empty); existing rows are never rewritten.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::manifest::csv_escape;
use crate::types::Timestamp;

/// Column header of the history file.
pub const HISTORY_HEADER: &str = "timestamp,prompt,style,seed,status,duration_secs,filename";

/// Final state of one job attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Submitted and at least one output was archived.
    Success,
    /// The server rejected the submission.
    Failed,
    /// The submission could not be delivered (network, serialization).
    Error,
    /// Submitted, but nothing was archived before the poll limit.
    NoOutput,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::Error => "Error",
            Self::NoOutput => "NoOutput",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One history row.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub timestamp: Timestamp,
    pub prompt: String,
    /// Style label, empty when no preset was applied.
    pub style: String,
    pub seed: u64,
    pub status: JobStatus,
    pub duration: Duration,
    pub filename: String,
}

impl HistoryEntry {
    /// Render the entry as a CSV row (no trailing newline).
    pub fn to_csv_row(&self) -> String {
        [
            self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, false),
            csv_escape(&self.prompt),
            csv_escape(&self.style),
            self.seed.to_string(),
            self.status.as_str().to_string(),
            format!("{:.2}", self.duration.as_secs_f64()),
            csv_escape(&self.filename),
        ]
        .join(",")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Failed to write job history {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Handle to the history CSV file.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry, writing the header first if the file is new.
    pub fn append(&self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        self.write_row(entry).map_err(|source| HistoryError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn write_row(&self, entry: &HistoryEntry) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut buf = String::new();
        if file.metadata()?.len() == 0 {
            buf.push_str(HISTORY_HEADER);
            buf.push('\n');
        }
        buf.push_str(&entry.to_csv_row());
        buf.push('\n');

        file.write_all(buf.as_bytes())
    }
}
