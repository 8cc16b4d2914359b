//! Recreation job: rebuild an artifact's sandbox from its stored files
//!
//! Runs after the lifecycle manager acquired the artifact's recreation
//! lease. The job owns the lease token carried by its request and releases
//! it before returning: by `complete_recreation` on success, by
//! `clear_recreation` on failure. A job whose lease expired and was taken
//! over leaves the flag to the new holder.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, info_span, warn, Instrument};

use super::{write_with_parents, JobError};
use crate::metrics::{RECREATIONS, RECREATIONS_IN_FLIGHT};
use crate::events::RecreationRequest;
use crate::sandbox::{SandboxHandle, SandboxProvider};
use crate::store::{Artifact, ProjectStore};

#[derive(Debug, Clone)]
pub struct RecreationSettings {
    pub template_id: String,
    pub sandbox_timeout: Duration,
    pub preview_port: u16,
}

impl Default for RecreationSettings {
    fn default() -> Self {
        Self {
            template_id: "nextjs-base".to_string(),
            sandbox_timeout: Duration::from_millis(600_000),
            preview_port: 3000,
        }
    }
}

pub struct RecreationJob {
    store: Arc<dyn ProjectStore>,
    sandboxes: Arc<dyn SandboxProvider>,
    settings: RecreationSettings,
}

impl RecreationJob {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        sandboxes: Arc<dyn SandboxProvider>,
        settings: RecreationSettings,
    ) -> Self {
        Self {
            store,
            sandboxes,
            settings,
        }
    }

    /// Recreate the sandbox behind the requested artifact, returning the
    /// updated artifact
    pub async fn run(&self, request: &RecreationRequest) -> Result<Artifact, JobError> {
        let artifact_id = request.artifact_id.as_str();
        let span = info_span!(
            "recreation_job",
            artifact_id = %artifact_id,
            otel.name = "recreation_job"
        );

        RECREATIONS_IN_FLIGHT.inc();
        let result = self.recreate(request).instrument(span).await;
        RECREATIONS_IN_FLIGHT.dec();

        match result {
            Ok(artifact) => {
                RECREATIONS.with_label_values(&["succeeded"]).inc();
                Ok(artifact)
            }
            Err(e) => {
                RECREATIONS.with_label_values(&["failed"]).inc();
                error!(artifact_id, error = %e, "Recreation failed, releasing lease");
                match self.store.clear_recreation(artifact_id, &request.lease).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(artifact_id, "Recreation lease was taken over, leaving flag to its holder")
                    }
                    Err(clear_err) => {
                        error!(artifact_id, error = %clear_err, "Could not release recreation lease")
                    }
                }
                Err(e)
            }
        }
    }

    async fn recreate(&self, request: &RecreationRequest) -> Result<Artifact, JobError> {
        let artifact_id = request.artifact_id.as_str();
        let artifact = self
            .store
            .find_artifact(artifact_id)
            .await?
            .ok_or_else(|| JobError::ArtifactNotFound(artifact_id.to_string()))?;

        let handle = SandboxHandle::create(
            self.sandboxes.as_ref(),
            &self.settings.template_id,
            self.settings.sandbox_timeout,
        )
        .await?;

        for (path, content) in artifact.files.iter() {
            write_with_parents(handle.sandbox(), path, content).await?;
        }

        let url = handle.preview_url(self.settings.preview_port);
        let updated = self
            .store
            .complete_recreation(artifact_id, &request.lease, &url)
            .await?;
        info!(
            artifact_id,
            sandbox_id = %handle.sandbox_id,
            files = artifact.files.len(),
            url = %url,
            "Sandbox recreated"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::FileSet;
    use crate::sandbox::MemorySandboxProvider;
    use crate::store::{JsonStore, NewArtifact, NewMessage};

    async fn seeded_store() -> (Arc<JsonStore>, Artifact, RecreationRequest) {
        let store = Arc::new(JsonStore::in_memory());
        let project = store.create_project("p").await.unwrap();
        let (_, artifact) = store
            .create_message(NewMessage::result(
                &project.id,
                "Here you go",
                NewArtifact {
                    sandbox_url: "https://3000-dead.sandbox.local".into(),
                    title: "Todo App".into(),
                    files: FileSet::from_iter([("app/page.tsx", "page"), ("lib/util.ts", "util")]),
                },
            ))
            .await
            .unwrap();
        let artifact = artifact.unwrap();
        let lease = store
            .try_begin_recreation(&artifact.id, Duration::from_secs(300))
            .await
            .unwrap()
            .unwrap();
        let request = RecreationRequest {
            artifact_id: artifact.id.clone(),
            lease,
        };
        (store, artifact, request)
    }

    #[tokio::test]
    async fn test_recreation_rewrites_files_and_updates_url() {
        let (store, artifact, request) = seeded_store().await;
        let provider = Arc::new(MemorySandboxProvider::new());
        let job = RecreationJob::new(store.clone(), provider.clone(), RecreationSettings::default());

        let updated = job.run(&request).await.unwrap();
        assert!(!updated.is_recreating);
        assert_ne!(updated.sandbox_url, artifact.sandbox_url);

        let sandbox_id = updated
            .sandbox_url
            .trim_start_matches("https://3000-")
            .trim_end_matches(".sandbox.local");
        let sandbox = provider.sandbox(sandbox_id).unwrap();
        assert_eq!(sandbox.files(), artifact.files);
        assert_eq!(sandbox.timeout(), Some(Duration::from_millis(600_000)));
    }

    #[tokio::test]
    async fn test_failed_write_still_clears_flag() {
        let (store, artifact, request) = seeded_store().await;
        let provider = Arc::new(MemorySandboxProvider::new());
        provider.set_fail_writes(true);
        let job = RecreationJob::new(store.clone(), provider.clone(), RecreationSettings::default());

        assert!(job.run(&request).await.is_err());
        assert_eq!(provider.created_count(), 1);

        let stored = store.find_artifact(&artifact.id).await.unwrap().unwrap();
        assert!(!stored.is_recreating);
        assert_eq!(stored.sandbox_url, artifact.sandbox_url);
    }

    #[tokio::test]
    async fn test_failed_create_still_clears_flag() {
        let (store, artifact, request) = seeded_store().await;
        let provider = Arc::new(MemorySandboxProvider::new());
        provider.set_fail_create(true);
        let job = RecreationJob::new(store.clone(), provider, RecreationSettings::default());

        assert!(matches!(job.run(&request).await, Err(JobError::Sandbox(_))));
        let stored = store.find_artifact(&artifact.id).await.unwrap().unwrap();
        assert!(!stored.is_recreating);
    }

    #[tokio::test]
    async fn test_superseded_job_leaves_new_lease_alone() {
        let (store, artifact, stale) = seeded_store().await;
        let current = store
            .try_begin_recreation(&artifact.id, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        let provider = Arc::new(MemorySandboxProvider::new());
        let job = RecreationJob::new(store.clone(), provider, RecreationSettings::default());

        // The old request can neither publish its url nor drop the flag
        assert!(job.run(&stale).await.is_err());
        let stored = store.find_artifact(&artifact.id).await.unwrap().unwrap();
        assert!(stored.is_recreating);
        assert_eq!(stored.recreation_lease.as_deref(), Some(current.as_str()));
        assert_eq!(stored.sandbox_url, artifact.sandbox_url);
    }
}
