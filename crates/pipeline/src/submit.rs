//! Job submission seam.
//!
//! The orchestrator only needs "send this graph, tell me the job id";
//! [`JobSubmitter`] captures that so tests can run without a server.

use aigc_comfyui::api::{ComfyUIApi, ComfyUIApiError};
use aigc_core::workflow::WorkflowGraph;

/// Why a submission did not produce a job id.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The server answered and refused the workflow.
    #[error("Submission rejected: {0}")]
    Rejected(String),

    /// The request never completed.
    #[error("Submission failed: {0}")]
    Transport(String),
}

impl From<ComfyUIApiError> for SubmitError {
    fn from(err: ComfyUIApiError) -> Self {
        if err.is_rejection() {
            Self::Rejected(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Something that can queue a materialized workflow.
pub trait JobSubmitter: Send + Sync {
    /// Submit `workflow`, returning the server-assigned job id.
    fn submit(
        &self,
        workflow: &WorkflowGraph,
    ) -> impl std::future::Future<Output = Result<String, SubmitError>> + Send;
}

impl<T: JobSubmitter> JobSubmitter for &T {
    fn submit(
        &self,
        workflow: &WorkflowGraph,
    ) -> impl std::future::Future<Output = Result<String, SubmitError>> + Send {
        (**self).submit(workflow)
    }
}

/// [`JobSubmitter`] backed by a live ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ComfyUISubmitter {
    api: ComfyUIApi,
    client_id: String,
}

impl ComfyUISubmitter {
    /// Wrap `api`, identifying this process with a fresh client id.
    pub fn new(api: ComfyUIApi) -> Self {
        Self {
            api,
            client_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl JobSubmitter for ComfyUISubmitter {
    async fn submit(&self, workflow: &WorkflowGraph) -> Result<String, SubmitError> {
        let response = self.api.submit_workflow(workflow, &self.client_id).await?;
        tracing::debug!(
            prompt_id = %response.prompt_id,
            queue_number = response.number,
            "Workflow queued",
        );
        Ok(response.prompt_id)
    }
}
