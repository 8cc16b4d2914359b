//! Background jobs and the worker that runs them
//!
//! Each event popped from the queue becomes one independent tokio task. Jobs
//! share nothing in memory: coordination goes through the store (the
//! artifact's recreation lease) and every job owns exactly one sandbox.
//!
//! - [`GenerationJob`] handles `code-agent/run`
//! - [`RecreationJob`] handles `sandbox/recreate`

pub mod generation;
pub mod recreation;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::events::JobEvent;
use crate::sandbox::{parent_dir, Sandbox, SandboxError};
use crate::store::StoreError;

pub use generation::{GenerationJob, GenerationOutput, GenerationSettings};
pub use recreation::{RecreationJob, RecreationSettings};

/// Error type for job execution
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("artifact {0} not found")]
    ArtifactNotFound(String),
}

/// Write one file, creating its parent directory first (best effort)
pub(crate) async fn write_with_parents(
    sandbox: &dyn Sandbox,
    path: &str,
    content: &str,
) -> Result<(), SandboxError> {
    if let Some(parent) = parent_dir(path) {
        if let Err(e) = sandbox.make_dir(parent).await {
            tracing::debug!(path, error = %e, "Could not create parent directory");
        }
    }
    sandbox.write_file(path, content).await
}

/// Drains the event queue, spawning one task per job
pub struct JobWorker {
    generation: Arc<GenerationJob>,
    recreation: Arc<RecreationJob>,
}

impl JobWorker {
    pub fn new(generation: Arc<GenerationJob>, recreation: Arc<RecreationJob>) -> Self {
        Self {
            generation,
            recreation,
        }
    }

    /// Run until every dispatcher feeding `rx` has been dropped
    pub async fn run(self, mut rx: mpsc::Receiver<JobEvent>) {
        info!("Job worker started");
        while let Some(event) = rx.recv().await {
            match event {
                JobEvent::Generation(request) => {
                    let job = self.generation.clone();
                    tokio::spawn(async move {
                        if let Err(e) = job.run(&request).await {
                            error!(project_id = %request.project_id, error = %e, "Generation job failed");
                        }
                    });
                }
                JobEvent::Recreation(request) => {
                    let job = self.recreation.clone();
                    tokio::spawn(async move {
                        if let Err(e) = job.run(&request).await {
                            error!(artifact_id = %request.artifact_id, error = %e, "Recreation job failed");
                        }
                    });
                }
            }
        }
        info!("Event queue closed, job worker stopping");
    }
}
