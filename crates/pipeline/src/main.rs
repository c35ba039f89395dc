//! `aigc-pipeline` -- batch image generation against a ComfyUI server.
//!
//! Loads a workflow template exported from ComfyUI, patches it per job,
//! submits it, and archives the generated images into the project
//! directory. Runs a single job when `PROMPT` is set, otherwise every
//! pending row of the job manifest.
//!
//! See [`aigc_core::config`] for the environment variables.

use aigc_comfyui::api::ComfyUIApi;
use aigc_core::config::PipelineConfig;
use aigc_core::manifest::load_manifest;
use aigc_core::workflow::WorkflowTemplate;
use aigc_pipeline::runner::{JobSpec, Pipeline};
use aigc_pipeline::submit::ComfyUISubmitter;
use anyhow::Context;
use tokio_util::sync::CancellationToken;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aigc_pipeline=info,aigc_core=info,aigc_comfyui=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PipelineConfig::from_env().context("Invalid configuration")?;

    let template = WorkflowTemplate::load(&config.template_path)?;
    tracing::info!(
        path = %config.template_path.display(),
        nodes = template.materialize().len(),
        "Workflow template loaded",
    );
    for link in template.materialize().dangling_links() {
        tracing::warn!(
            node_id = %link.node_id,
            input = %link.input_name,
            missing_upstream = %link.missing_upstream,
            "Template references a node that does not exist",
        );
    }

    let api = ComfyUIApi::new(config.comfyui_url.clone());
    if !api.is_server_ready().await {
        anyhow::bail!("ComfyUI server at {} is not reachable", api.api_url());
    }
    tracing::info!(url = %api.api_url(), "ComfyUI server is ready");

    let jobs: Vec<JobSpec> = match &config.single_job {
        Some(job) => vec![JobSpec::from(job)],
        None => load_manifest(&config.jobs_path)?
            .into_iter()
            .map(JobSpec::from)
            .collect(),
    };
    if jobs.is_empty() {
        tracing::info!(path = %config.jobs_path.display(), "No pending jobs");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping");
                cancel.cancel();
            }
        });
    }

    let mut pipeline = Pipeline::from_config(&config, template, ComfyUISubmitter::new(api))?;
    let summary = pipeline.run_batch(&jobs, &cancel).await;

    tracing::info!(
        history = %pipeline.history().path().display(),
        archive = %pipeline.archiver().target_dir().display(),
        succeeded = summary.succeeded,
        total = summary.total,
        "Pipeline finished",
    );
    Ok(())
}
