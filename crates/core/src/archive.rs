//! Asset archiver for the image server's output directory.
//!
//! The image server writes finished images into a shared output
//! directory at its own pace and exposes no completion signal we can
//! correlate with a job. [`AssetArchiver::sync`] therefore treats any
//! recognised image younger than a recency window as "just produced"
//! and moves it into the project directory under a collision-safe name.
//!
//! Moving (not copying) is what makes repeated polling safe: once a file
//! has been archived it is gone from the source directory, so the next
//! scan cannot pick it up again.
//!
//! `sync` never fails. A missing source directory, an unreadable entry,
//! or a file that vanishes mid-move (the producer is writing concurrently)
//! is logged and skipped.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};

use crate::naming::{archive_filename, disambiguate};
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default recency window: files older than this are left behind.
pub const DEFAULT_RECENCY_WINDOW: Duration = Duration::from_secs(60);

/// Image extensions the archiver recognises (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Default tag prepended to archived filenames.
pub const DEFAULT_PROJECT_TAG: &str = "Project";

/// Upper bound on disambiguation attempts for a single destination name.
const MAX_DISAMBIGUATION_ATTEMPTS: u32 = 1000;

/// The save node zero-pads its counter to at least this many digits.
const SAVE_COUNTER_MIN_DIGITS: usize = 5;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Archiver construction parameters.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Directory the image server writes into (read + delete).
    pub source_dir: PathBuf,
    /// Project-owned archive directory (create + write).
    pub target_dir: PathBuf,
    /// Prefix for archived filenames.
    pub project_tag: String,
    /// Lowercase extensions without the dot.
    pub extensions: Vec<String>,
}

impl ArchiveConfig {
    pub fn new(source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
            project_tag: DEFAULT_PROJECT_TAG.to_string(),
            extensions: IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn with_project_tag(mut self, tag: impl Into<String>) -> Self {
        self.project_tag = tag.into();
        self
    }
}

/// Optional job correlation on top of the recency window.
#[derive(Debug, Clone, Default)]
pub struct ArchiveFilter {
    /// Only archive files the save node wrote for this `filename_prefix`,
    /// i.e. named `{prefix}_{counter}_.{ext}`.
    pub filename_prefix: Option<String>,
}

impl ArchiveFilter {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            filename_prefix: Some(prefix.into()),
        }
    }

    fn matches(&self, file_name: &str) -> bool {
        match &self.filename_prefix {
            Some(prefix) => is_save_output(file_name, prefix),
            None => true,
        }
    }
}

/// How a file reached the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocateMethod {
    /// Atomic rename on the same filesystem.
    Renamed,
    /// Copy, verify, then delete the source.
    Copied,
}

/// One successfully archived file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedAsset {
    /// Filename in the source directory.
    pub source_name: String,
    /// Full path in the target directory.
    pub destination: PathBuf,
    pub method: RelocateMethod,
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub moved: Vec<ArchivedAsset>,
    /// Recognised images left behind because they are outside the window.
    pub stale: usize,
    /// Files that were eligible (or unreadable) but could not be moved.
    pub failed: usize,
    /// The source directory did not exist.
    pub source_missing: bool,
}

impl SyncReport {
    pub fn moved_count(&self) -> usize {
        self.moved.len()
    }
}

/// Errors raised while setting up the archiver.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Failed to create archive directory {}: {source}", .path.display())]
    CreateTarget { path: PathBuf, source: io::Error },
}

/// A candidate file found in the source directory.
struct Candidate {
    name: String,
    path: PathBuf,
    modified: Timestamp,
}

// ---------------------------------------------------------------------------
// AssetArchiver
// ---------------------------------------------------------------------------

/// Moves freshly produced images from the server's output directory into
/// the project directory.
#[derive(Debug, Clone)]
pub struct AssetArchiver {
    config: ArchiveConfig,
}

impl AssetArchiver {
    /// Create an archiver, creating the target directory if needed.
    pub fn new(config: ArchiveConfig) -> Result<Self, ArchiveError> {
        fs::create_dir_all(&config.target_dir).map_err(|source| ArchiveError::CreateTarget {
            path: config.target_dir.clone(),
            source,
        })?;
        Ok(Self { config })
    }

    pub fn source_dir(&self) -> &Path {
        &self.config.source_dir
    }

    pub fn target_dir(&self) -> &Path {
        &self.config.target_dir
    }

    /// Archive every recognised image younger than `window`.
    ///
    /// Returns the number of files moved.
    pub fn sync(&self, window: Duration) -> usize {
        self.sync_report(window, &ArchiveFilter::default())
            .moved_count()
    }

    /// Like [`sync`](Self::sync), restricted by `filter`.
    pub fn sync_matching(&self, window: Duration, filter: &ArchiveFilter) -> usize {
        self.sync_report(window, filter).moved_count()
    }

    /// Run a sync pass against the current wall clock.
    pub fn sync_report(&self, window: Duration, filter: &ArchiveFilter) -> SyncReport {
        self.sync_at(window, filter, Local::now())
    }

    /// Run a sync pass treating `now` as the current time.
    ///
    /// `now` drives both the recency check and the timestamp embedded in
    /// destination names.
    pub fn sync_at(&self, window: Duration, filter: &ArchiveFilter, now: Timestamp) -> SyncReport {
        self.sync_with(window, filter, now, relocate)
    }

    // ---- private helpers ----

    /// Sync pass with the per-file move step supplied by the caller.
    fn sync_with<F>(
        &self,
        window: Duration,
        filter: &ArchiveFilter,
        now: Timestamp,
        mut move_file: F,
    ) -> SyncReport
    where
        F: FnMut(&Path, &Path) -> io::Result<RelocateMethod>,
    {
        let mut report = SyncReport::default();
        let source_dir = &self.config.source_dir;

        if !source_dir.is_dir() {
            tracing::warn!(
                source_dir = %source_dir.display(),
                "Source directory does not exist, nothing to archive",
            );
            report.source_missing = true;
            return report;
        }

        // The target may have been removed since construction.
        if let Err(e) = fs::create_dir_all(&self.config.target_dir) {
            tracing::warn!(
                target_dir = %self.config.target_dir.display(),
                error = %e,
                "Archive directory unavailable, skipping sync",
            );
            return report;
        }

        let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
        let mut candidates = self.scan(filter, &mut report);
        candidates.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));

        let mut claimed = HashSet::new();
        for candidate in candidates {
            // Strictly younger than the window; future mtimes count as fresh.
            if now.signed_duration_since(candidate.modified) >= window {
                report.stale += 1;
                continue;
            }

            let Some(destination) = self.destination_for(&candidate.name, &now, &mut claimed) else {
                tracing::warn!(
                    file = %candidate.name,
                    "No free destination name, skipping",
                );
                report.failed += 1;
                continue;
            };

            match move_file(&candidate.path, &destination) {
                Ok(method) => {
                    tracing::info!(
                        file = %candidate.name,
                        destination = %destination.display(),
                        ?method,
                        "Archived asset",
                    );
                    report.moved.push(ArchivedAsset {
                        source_name: candidate.name,
                        destination,
                        method,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        file = %candidate.name,
                        error = %e,
                        "Failed to archive asset, skipping",
                    );
                    report.failed += 1;
                }
            }
        }

        if report.moved_count() > 0 {
            tracing::info!(
                moved = report.moved_count(),
                stale = report.stale,
                failed = report.failed,
                "Archive sync complete",
            );
        }

        report
    }

    /// List recognised image files in the source directory.
    fn scan(&self, filter: &ArchiveFilter, report: &mut SyncReport) -> Vec<Candidate> {
        let entries = match fs::read_dir(&self.config.source_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    source_dir = %self.config.source_dir.display(),
                    error = %e,
                    "Failed to list source directory",
                );
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.is_recognised(&name) || !filter.matches(&name) {
                continue;
            }

            // The producer may delete or replace files at any moment.
            let metadata = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(file = %name, error = %e, "File vanished before inspection");
                    continue;
                }
            };

            let modified = match metadata.modified() {
                Ok(t) => DateTime::<Local>::from(t),
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "Modification time unavailable");
                    report.failed += 1;
                    continue;
                }
            };

            candidates.push(Candidate {
                name,
                path: entry.path(),
                modified,
            });
        }
        candidates
    }

    fn is_recognised(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.config.extensions.iter().any(|known| *known == ext)
            })
            .unwrap_or(false)
    }

    /// Pick a destination path that exists neither on disk nor earlier in
    /// this pass.
    fn destination_for(
        &self,
        source_name: &str,
        now: &Timestamp,
        claimed: &mut HashSet<PathBuf>,
    ) -> Option<PathBuf> {
        let base = archive_filename(&self.config.project_tag, now, source_name);
        let mut path = self.config.target_dir.join(&base);

        let mut attempt = 0;
        while path.exists() || claimed.contains(&path) {
            if attempt >= MAX_DISAMBIGUATION_ATTEMPTS {
                return None;
            }
            path = self
                .config
                .target_dir
                .join(disambiguate(&base, now.timestamp_subsec_millis(), attempt));
            attempt += 1;
        }

        claimed.insert(path.clone());
        Some(path)
    }
}

/// Whether `file_name` is `{prefix}_{counter}_.{ext}`.
///
/// Job `cat` must not match `cat_2_00001_.png`.
fn is_save_output(file_name: &str, prefix: &str) -> bool {
    let Some(rest) = file_name
        .strip_prefix(prefix)
        .and_then(|r| r.strip_prefix('_'))
    else {
        return false;
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    digits >= SAVE_COUNTER_MIN_DIGITS && rest[digits..].starts_with("_.")
}

// ---------------------------------------------------------------------------
// Relocation
// ---------------------------------------------------------------------------

/// Move `src` to `dst`, removing `src`.
///
/// Tries an atomic rename first. If that fails for any reason other than
/// the source having disappeared (e.g. the target is on another
/// filesystem), falls back to [`copy_then_remove`].
pub fn relocate(src: &Path, dst: &Path) -> io::Result<RelocateMethod> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(RelocateMethod::Renamed),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e),
        Err(e) => {
            tracing::debug!(
                src = %src.display(),
                error = %e,
                "Rename failed, falling back to copy",
            );
            copy_then_remove(src, dst)?;
            Ok(RelocateMethod::Copied)
        }
    }
}

/// Copy `src` to `dst`, check the copy landed intact, then delete `src`.
///
/// If the source cannot be deleted the copy is removed again, so a file is
/// never left in both places (which would archive it twice).
pub fn copy_then_remove(src: &Path, dst: &Path) -> io::Result<()> {
    let copied = fs::copy(src, dst)?;

    let written = match fs::metadata(dst) {
        Ok(m) => m.len(),
        Err(e) => {
            let _ = fs::remove_file(dst);
            return Err(e);
        }
    };
    if written != copied {
        let _ = fs::remove_file(dst);
        return Err(io::Error::other(format!(
            "copy of {} is incomplete ({written} of {copied} bytes)",
            src.display()
        )));
    }

    if let Err(e) = fs::remove_file(src) {
        let _ = fs::remove_file(dst);
        return Err(e);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
