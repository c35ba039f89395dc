//! Per-job and batch execution.

use std::path::Path;
use std::time::{Duration, Instant};

use aigc_core::archive::{ArchiveError, ArchiveFilter, AssetArchiver};
use aigc_core::config::{NodeBindings, PipelineConfig, RenderOverrides, SingleJob};
use aigc_core::history::{HistoryEntry, HistoryLog, JobStatus};
use aigc_core::manifest::{ManifestJob, SeedSpec};
use aigc_core::naming::sanitize_tag;
use aigc_core::style::{compose_prompt, find_preset, StylePreset};
use aigc_core::workflow::{WorkflowTemplate, CKPT_NAME_INPUT, IMAGES_INPUT};
use tokio_util::sync::CancellationToken;

use crate::poll::{wait_for_assets, PollConfig, WaitOutcome};
use crate::submit::{JobSubmitter, SubmitError};

/// Filename used for a job given through the environment.
pub const SINGLE_JOB_FILENAME: &str = "single";

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub prompt: String,
    pub style: Option<String>,
    pub seed: SeedSpec,
    /// Output name; its stem becomes the save node's filename prefix.
    pub filename: String,
}

impl From<ManifestJob> for JobSpec {
    fn from(job: ManifestJob) -> Self {
        Self {
            prompt: job.prompt,
            style: job.style,
            seed: job.seed,
            filename: job.filename,
        }
    }
}

impl From<&SingleJob> for JobSpec {
    fn from(job: &SingleJob) -> Self {
        Self {
            prompt: job.prompt.clone(),
            style: job.style.clone(),
            seed: job.seed,
            filename: SINGLE_JOB_FILENAME.to_string(),
        }
    }
}

/// What happened to one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub status: JobStatus,
    /// Seed actually written into the workflow.
    pub seed: u64,
    pub prompt_id: Option<String>,
    pub archived: usize,
    pub duration: Duration,
}

/// Tally of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errored: usize,
    pub no_output: usize,
    /// Jobs not started because the run was cancelled.
    pub skipped: usize,
    pub archived: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &JobOutcome) {
        match outcome.status {
            JobStatus::Success => self.succeeded += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Error => self.errored += 1,
            JobStatus::NoOutput => self.no_output += 1,
        }
        self.archived += outcome.archived;
    }
}

/// Drives jobs through template, submitter, archiver, and history.
pub struct Pipeline<S> {
    template: WorkflowTemplate,
    submitter: S,
    archiver: AssetArchiver,
    history: HistoryLog,
    nodes: NodeBindings,
    overrides: RenderOverrides,
    recency_window: Duration,
    poll: PollConfig,
}

impl<S: JobSubmitter> Pipeline<S> {
    /// Assemble a pipeline from loaded configuration.
    ///
    /// Creates the archive directory if it does not exist.
    pub fn from_config(
        config: &PipelineConfig,
        template: WorkflowTemplate,
        submitter: S,
    ) -> Result<Self, ArchiveError> {
        Ok(Self {
            template,
            submitter,
            archiver: AssetArchiver::new(config.archive.clone())?,
            history: HistoryLog::new(&config.history_path),
            nodes: config.nodes.clone(),
            overrides: config.overrides.clone(),
            recency_window: config.recency_window,
            poll: PollConfig::from(config),
        })
    }

    pub fn archiver(&self) -> &AssetArchiver {
        &self.archiver
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Run one job end to end and record it in the history.
    pub async fn run_job(&mut self, job: &JobSpec, cancel: &CancellationToken) -> JobOutcome {
        let started = Instant::now();
        let preset = resolve_style(job.style.as_deref());
        let (seed, filter) = self.prepare(job, preset);

        let (status, prompt_id, archived) = match self.submitter.submit(self.template.materialize()).await {
            Ok(prompt_id) => {
                tracing::info!(
                    prompt_id = %prompt_id,
                    filename = %job.filename,
                    seed,
                    "Job submitted",
                );
                let outcome = wait_for_assets(
                    &self.archiver,
                    self.recency_window,
                    &filter,
                    &self.poll,
                    cancel,
                )
                .await;
                let status = match outcome {
                    WaitOutcome::Archived(_) => JobStatus::Success,
                    WaitOutcome::TimedOut | WaitOutcome::Cancelled => JobStatus::NoOutput,
                };
                (status, Some(prompt_id), outcome.moved())
            }
            Err(e) => {
                tracing::error!(filename = %job.filename, error = %e, "Job submission failed");
                let status = match e {
                    SubmitError::Rejected(_) => JobStatus::Failed,
                    SubmitError::Transport(_) => JobStatus::Error,
                };
                (status, None, 0)
            }
        };

        let outcome = JobOutcome {
            status,
            seed,
            prompt_id,
            archived,
            duration: started.elapsed(),
        };

        let entry = HistoryEntry {
            timestamp: chrono::Local::now(),
            prompt: job.prompt.clone(),
            style: preset.map(|p| p.label.to_string()).unwrap_or_default(),
            seed,
            status,
            duration: outcome.duration,
            filename: job.filename.clone(),
        };
        if let Err(e) = self.history.append(&entry) {
            tracing::warn!(error = %e, "Failed to record job history");
        }

        tracing::info!(
            filename = %job.filename,
            status = %status,
            archived,
            duration_ms = outcome.duration.as_millis() as u64,
            "Job finished",
        );
        outcome
    }

    /// Run jobs in order until done or cancelled.
    ///
    /// A failing job never stops the batch.
    pub async fn run_batch(&mut self, jobs: &[JobSpec], cancel: &CancellationToken) -> BatchSummary {
        let mut summary = BatchSummary {
            total: jobs.len(),
            ..Default::default()
        };

        for (index, job) in jobs.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.skipped = jobs.len() - index;
                tracing::warn!(skipped = summary.skipped, "Batch cancelled");
                break;
            }

            tracing::info!(
                job = index + 1,
                total = jobs.len(),
                filename = %job.filename,
                "Starting job",
            );
            let outcome = self.run_job(job, cancel).await;
            summary.record(&outcome);
        }

        tracing::info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            errored = summary.errored,
            no_output = summary.no_output,
            skipped = summary.skipped,
            archived = summary.archived,
            "Batch complete",
        );
        summary
    }

    // ---- private helpers ----

    /// Reset the template and apply every per-job and per-run mutation.
    ///
    /// Returns the seed in effect and the archive filter for this job.
    fn prepare(&mut self, job: &JobSpec, preset: Option<&StylePreset>) -> (u64, ArchiveFilter) {
        self.template.reset();

        let prompt = compose_prompt(&job.prompt, preset);
        self.template.set_text_field(&self.nodes.prompt, &prompt);

        let seed = match job.seed {
            SeedSpec::Fixed(seed) => {
                self.template.set_seed(&self.nodes.seed, seed);
                seed
            }
            SeedSpec::Auto => self.template.randomize_seed(&self.nodes.seed),
        };

        if let (Some(node), Some(name)) = (&self.nodes.checkpoint, &self.overrides.checkpoint_name) {
            self.template.set_model(node, CKPT_NAME_INPUT, name);
        }
        if let (Some(node), Some((width, height))) = (&self.nodes.latent, self.overrides.dimensions) {
            self.template.set_dimensions(node, width, height);
        }

        let Some(save) = &self.nodes.save else {
            return (seed, ArchiveFilter::default());
        };

        if let (Some(routes), Some(upscale)) = (&self.nodes.routes, self.overrides.upscale) {
            self.template.route_output(save, IMAGES_INPUT, upscale, routes);
        }

        let prefix = filename_prefix(&job.filename);
        if self.template.set_filename_prefix(save, &prefix).is_applied() {
            (seed, ArchiveFilter::with_prefix(prefix))
        } else {
            (seed, ArchiveFilter::default())
        }
    }
}

/// Look up a style, warning when the name is unknown.
fn resolve_style(style: Option<&str>) -> Option<&'static StylePreset> {
    let name = style?;
    let preset = find_preset(name);
    if preset.is_none() {
        tracing::warn!(style = %name, "Unknown style, using prompt as is");
    }
    preset
}

/// Save-node prefix for a job: the filename stem, made filesystem-safe.
pub fn filename_prefix(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix = sanitize_tag(&stem);
    if prefix.is_empty() {
        SINGLE_JOB_FILENAME.to_string()
    } else {
        prefix
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_strips_extension() {
        assert_eq!(filename_prefix("cat.png"), "cat");
        assert_eq!(filename_prefix("job_0001"), "job_0001");
    }

    #[test]
    fn prefix_falls_back_when_empty() {
        assert_eq!(filename_prefix(""), SINGLE_JOB_FILENAME);
    }

    #[test]
    fn unknown_style_resolves_to_none() {
        assert!(resolve_style(Some("watercolor")).is_none());
        assert!(resolve_style(None).is_none());
        assert_eq!(resolve_style(Some("anime")).map(|p| p.key), Some("anime"));
    }

    #[test]
    fn summary_counts_by_status() {
        let mut summary = BatchSummary::default();
        for (status, archived) in [
            (JobStatus::Success, 2),
            (JobStatus::Failed, 0),
            (JobStatus::NoOutput, 0),
            (JobStatus::Success, 1),
        ] {
            summary.record(&JobOutcome {
                status,
                seed: 1,
                prompt_id: None,
                archived,
                duration: Duration::ZERO,
            });
        }
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.no_output, 1);
        assert_eq!(summary.errored, 0);
        assert_eq!(summary.archived, 3);
    }

    #[test]
    fn manifest_job_converts() {
        let job = JobSpec::from(ManifestJob {
            row: 1,
            id: Some("7".to_string()),
            prompt: "a cat".to_string(),
            filename: "cat.png".to_string(),
            seed: SeedSpec::Fixed(42),
            style: Some("anime".to_string()),
        });
        assert_eq!(job.filename, "cat.png");
        assert_eq!(job.seed, SeedSpec::Fixed(42));
    }
}
