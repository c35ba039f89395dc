//! Pipeline configuration.
//!
//! Everything the pipeline needs is read once at startup into
//! [`PipelineConfig`] and handed to each component; nothing is read from
//! the environment after that.
//!
//! # Environment variables
//!
//! | Variable                 | Required | Default                     |
//! |--------------------------|----------|-----------------------------|
//! | `COMFYUI_URL`            | no       | `http://127.0.0.1:8188`     |
//! | `COMFY_OUTPUT_DIR`       | yes      | --                          |
//! | `PROJECT_OUTPUT_DIR`     | no       | `output`                    |
//! | `TEMPLATE_PATH`          | no       | `config/workflow_api.json`  |
//! | `JOBS_PATH`              | no       | `jobs.csv`                  |
//! | `HISTORY_PATH`           | no       | `history.csv`               |
//! | `PROJECT_TAG`            | no       | `Project`                   |
//! | `RECENCY_WINDOW_SECS`    | no       | `60`                        |
//! | `POLL_INTERVAL_SECS`     | no       | `2`                         |
//! | `MAX_POLLS`              | no       | `30`                        |
//! | `NODE_ID_PROMPT`         | no       | `6`                         |
//! | `NODE_ID_SEED`           | no       | `3`                         |
//! | `NODE_ID_SAVE`           | no       | --                          |
//! | `NODE_ID_CHECKPOINT`     | no       | --                          |
//! | `CHECKPOINT_NAME`        | no       | --                          |
//! | `NODE_ID_LATENT`         | no       | --                          |
//! | `IMAGE_WIDTH` / `IMAGE_HEIGHT` | no | -- (both or neither)       |
//! | `NODE_ID_DIRECT_DECODE` / `NODE_ID_UPSCALE_DECODE` | no | -- (both or neither) |
//! | `UPSCALE`                | no       | --                          |
//! | `PROMPT`                 | no       | -- (single-job mode when set) |
//! | `STYLE`                  | no       | --                          |
//! | `SEED`                   | no       | auto                        |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::archive::{ArchiveConfig, DEFAULT_PROJECT_TAG, DEFAULT_RECENCY_WINDOW};
use crate::error::CoreError;
use crate::manifest::SeedSpec;
use crate::types::NodeId;
use crate::workflow::{NodeLink, OutputRoutes};

/// Default ComfyUI HTTP endpoint.
pub const DEFAULT_COMFYUI_URL: &str = "http://127.0.0.1:8188";

/// Default pause between archive polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default number of archive polls per job.
pub const DEFAULT_MAX_POLLS: u32 = 30;

/// Default prompt node (`CLIPTextEncode`) in the stock text-to-image export.
pub const DEFAULT_PROMPT_NODE: &str = "6";

/// Default sampler node (`KSampler`) in the stock text-to-image export.
pub const DEFAULT_SEED_NODE: &str = "3";

/// Which template nodes the pipeline patches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeBindings {
    pub prompt: NodeId,
    pub seed: NodeId,
    /// `SaveImage` node; when bound, its `filename_prefix` is set per job
    /// and used to correlate archived files.
    pub save: Option<NodeId>,
    pub checkpoint: Option<NodeId>,
    pub latent: Option<NodeId>,
    /// Alternate image sources for the save node.
    pub routes: Option<OutputRoutes>,
}

impl Default for NodeBindings {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT_NODE.to_string(),
            seed: DEFAULT_SEED_NODE.to_string(),
            save: None,
            checkpoint: None,
            latent: None,
            routes: None,
        }
    }
}

/// Per-run overrides applied to every job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOverrides {
    pub checkpoint_name: Option<String>,
    pub dimensions: Option<(u32, u32)>,
    pub upscale: Option<bool>,
}

/// A job given directly through the environment instead of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleJob {
    pub prompt: String,
    pub style: Option<String>,
    pub seed: SeedSpec,
}

/// Complete pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub comfyui_url: String,
    pub template_path: PathBuf,
    pub jobs_path: PathBuf,
    pub history_path: PathBuf,
    pub archive: ArchiveConfig,
    pub recency_window: Duration,
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub nodes: NodeBindings,
    pub overrides: RenderOverrides,
    pub single_job: Option<SingleJob>,
}

impl PipelineConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let source_dir = get("COMFY_OUTPUT_DIR").ok_or_else(|| {
            CoreError::Validation("COMFY_OUTPUT_DIR must be set".to_string())
        })?;
        let target_dir = get("PROJECT_OUTPUT_DIR").unwrap_or_else(|| "output".to_string());
        let project_tag = get("PROJECT_TAG").unwrap_or_else(|| DEFAULT_PROJECT_TAG.to_string());

        let recency_window = match parse_opt::<u64>("RECENCY_WINDOW_SECS", get("RECENCY_WINDOW_SECS"))? {
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_RECENCY_WINDOW,
        };
        let poll_interval = match parse_opt::<u64>("POLL_INTERVAL_SECS", get("POLL_INTERVAL_SECS"))? {
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_POLL_INTERVAL,
        };
        let max_polls =
            parse_opt::<u32>("MAX_POLLS", get("MAX_POLLS"))?.unwrap_or(DEFAULT_MAX_POLLS);

        let routes = match (get("NODE_ID_DIRECT_DECODE"), get("NODE_ID_UPSCALE_DECODE")) {
            (Some(direct), Some(upscaled)) => Some(OutputRoutes {
                direct: NodeLink::new(direct, 0),
                upscaled: NodeLink::new(upscaled, 0),
            }),
            (None, None) => None,
            _ => {
                return Err(CoreError::Validation(
                    "NODE_ID_DIRECT_DECODE and NODE_ID_UPSCALE_DECODE must be set together"
                        .to_string(),
                ))
            }
        };

        let nodes = NodeBindings {
            prompt: get("NODE_ID_PROMPT").unwrap_or_else(|| DEFAULT_PROMPT_NODE.to_string()),
            seed: get("NODE_ID_SEED").unwrap_or_else(|| DEFAULT_SEED_NODE.to_string()),
            save: get("NODE_ID_SAVE"),
            checkpoint: get("NODE_ID_CHECKPOINT"),
            latent: get("NODE_ID_LATENT"),
            routes,
        };

        let dimensions = match (
            parse_opt::<u32>("IMAGE_WIDTH", get("IMAGE_WIDTH"))?,
            parse_opt::<u32>("IMAGE_HEIGHT", get("IMAGE_HEIGHT"))?,
        ) {
            (Some(w), Some(h)) => Some((w, h)),
            (None, None) => None,
            _ => {
                return Err(CoreError::Validation(
                    "IMAGE_WIDTH and IMAGE_HEIGHT must be set together".to_string(),
                ))
            }
        };

        let upscale = get("UPSCALE").map(|v| parse_bool("UPSCALE", &v)).transpose()?;

        let overrides = RenderOverrides {
            checkpoint_name: get("CHECKPOINT_NAME"),
            dimensions,
            upscale,
        };

        let single_job = get("PROMPT").map(|prompt| SingleJob {
            prompt,
            style: get("STYLE"),
            seed: get("SEED").map_or(SeedSpec::Auto, |s| SeedSpec::parse(&s)),
        });

        let config = Self {
            comfyui_url: get("COMFYUI_URL").unwrap_or_else(|| DEFAULT_COMFYUI_URL.to_string()),
            template_path: get("TEMPLATE_PATH")
                .unwrap_or_else(|| "config/workflow_api.json".to_string())
                .into(),
            jobs_path: get("JOBS_PATH").unwrap_or_else(|| "jobs.csv".to_string()).into(),
            history_path: get("HISTORY_PATH")
                .unwrap_or_else(|| "history.csv".to_string())
                .into(),
            archive: ArchiveConfig::new(source_dir, target_dir).with_project_tag(project_tag),
            recency_window,
            poll_interval,
            max_polls,
            nodes,
            overrides,
            single_job,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_polls == 0 {
            return Err(CoreError::Validation(
                "MAX_POLLS must be at least 1".to_string(),
            ));
        }
        if self.recency_window.is_zero() {
            return Err(CoreError::Validation(
                "RECENCY_WINDOW_SECS must be greater than 0".to_string(),
            ));
        }
        if self.overrides.upscale.is_some() && self.nodes.routes.is_none() {
            return Err(CoreError::Validation(
                "UPSCALE requires NODE_ID_DIRECT_DECODE and NODE_ID_UPSCALE_DECODE".to_string(),
            ));
        }
        if self.overrides.upscale.is_some() && self.nodes.save.is_none() {
            return Err(CoreError::Validation(
                "UPSCALE requires NODE_ID_SAVE".to_string(),
            ));
        }
        if self.overrides.checkpoint_name.is_some() && self.nodes.checkpoint.is_none() {
            return Err(CoreError::Validation(
                "CHECKPOINT_NAME requires NODE_ID_CHECKPOINT".to_string(),
            ));
        }
        if self.overrides.dimensions.is_some() && self.nodes.latent.is_none() {
            return Err(CoreError::Validation(
                "IMAGE_WIDTH/IMAGE_HEIGHT require NODE_ID_LATENT".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse an optional numeric setting.
fn parse_opt<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>, CoreError> {
    value
        .map(|v| {
            v.parse::<T>().map_err(|_| {
                CoreError::Validation(format!("{key} must be a non-negative integer, got '{v}'"))
            })
        })
        .transpose()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, CoreError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CoreError::Validation(format!(
            "{key} must be a boolean (true/false), got '{other}'"
        ))),
    }
}
