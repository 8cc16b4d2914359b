//! Sandbox Lifecycle Manager - liveness of the sandbox behind an artifact
//!
//! Sandboxes expire. When an artifact's preview URL stops answering, the
//! manager rebuilds the sandbox from the stored files by dispatching a
//! `sandbox/recreate` event, making sure at most one recreation is in flight
//! per artifact.
//!
//! # States
//!
//! ```text
//!                probe ok
//!   ┌──────────────────────────────┐
//!   ▼                              │
//! READY(url) ──probe fails──► ensure_recreation ──► RECREATING
//!   ▲                                                  │
//!   │          job completes (new url, flag cleared)   │
//!   └──────────────────────────────────────────────────┘
//!                                                      │ job fails (own lease cleared)
//!                                                      ▼
//!                                                   FAILED (next probe decides)
//! ```
//!
//! [`SandboxLifecycleManager::poll_status`] is a pure query.
//! [`SandboxLifecycleManager::ensure_recreation`] is the only operation with a
//! side effect; [`SandboxLifecycleManager::check_validity`] composes the two.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::events::{DispatchError, EventDispatcher, JobEvent, RecreationRequest};
use crate::metrics::RECREATIONS;
use crate::sandbox::HealthProbe;
use crate::store::{Artifact, ProjectStore, StoreError};

/// Derived sandbox status, never stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "StatusWire", try_from = "StatusWire")]
pub enum SandboxStatus {
    Ready { url: String },
    Recreating,
    Failed,
}

impl SandboxStatus {
    pub fn url(&self) -> Option<&str> {
        match self {
            SandboxStatus::Ready { url } => Some(url),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxStatus::Ready { .. } => "ready",
            SandboxStatus::Recreating => "recreating",
            SandboxStatus::Failed => "failed",
        }
    }
}

/// Wire form: `{"url": string | null, "status": "ready" | "recreating" | "failed"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatusWire {
    url: Option<String>,
    status: String,
}

impl From<SandboxStatus> for StatusWire {
    fn from(status: SandboxStatus) -> Self {
        Self {
            status: status.as_str().to_string(),
            url: match status {
                SandboxStatus::Ready { url } => Some(url),
                _ => None,
            },
        }
    }
}

impl TryFrom<StatusWire> for SandboxStatus {
    type Error = String;

    fn try_from(wire: StatusWire) -> Result<Self, Self::Error> {
        match (wire.status.as_str(), wire.url) {
            ("ready", Some(url)) => Ok(SandboxStatus::Ready { url }),
            ("ready", None) => Err("ready status requires a url".to_string()),
            ("recreating", _) => Ok(SandboxStatus::Recreating),
            ("failed", _) => Ok(SandboxStatus::Failed),
            (other, _) => Err(format!("unknown sandbox status: {other}")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("artifact {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("could not dispatch recreation: {0}")]
    Dispatch(#[from] DispatchError),
}

pub struct SandboxLifecycleManager {
    store: Arc<dyn ProjectStore>,
    probe: Arc<dyn HealthProbe>,
    dispatcher: Arc<dyn EventDispatcher>,
    recreation_lease: Duration,
}

impl SandboxLifecycleManager {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        probe: Arc<dyn HealthProbe>,
        dispatcher: Arc<dyn EventDispatcher>,
        recreation_lease: Duration,
    ) -> Self {
        Self {
            store,
            probe,
            dispatcher,
            recreation_lease,
        }
    }

    async fn artifact(&self, artifact_id: &str) -> Result<Artifact, LifecycleError> {
        self.store
            .find_artifact(artifact_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(artifact_id.to_string()))
    }

    /// Probe the stored URL; start a recreation if it is dead.
    pub async fn check_validity(&self, artifact_id: &str) -> Result<SandboxStatus, LifecycleError> {
        let artifact = self.artifact(artifact_id).await?;
        if self.probe.is_alive(&artifact.sandbox_url).await {
            return Ok(SandboxStatus::Ready {
                url: artifact.sandbox_url,
            });
        }

        warn!(artifact_id, url = %artifact.sandbox_url, "Sandbox unreachable");
        self.ensure_recreation(artifact_id).await?;
        Ok(SandboxStatus::Recreating)
    }

    /// Current status without side effects: recreating while the lease is
    /// held, otherwise whatever a fresh probe says.
    pub async fn poll_status(&self, artifact_id: &str) -> Result<SandboxStatus, LifecycleError> {
        let artifact = self.artifact(artifact_id).await?;
        if artifact.lease_active(self.recreation_lease, Utc::now()) {
            return Ok(SandboxStatus::Recreating);
        }
        if self.probe.is_alive(&artifact.sandbox_url).await {
            Ok(SandboxStatus::Ready {
                url: artifact.sandbox_url,
            })
        } else {
            Ok(SandboxStatus::Failed)
        }
    }

    /// Make sure a recreation is in flight for `artifact_id`.
    ///
    /// Returns `true` when this call acquired the lease and dispatched the
    /// job, `false` when one was already running. The dispatched event
    /// carries the lease token; only its holder may release the flag. If
    /// the dispatch itself fails the lease is released again.
    pub async fn ensure_recreation(&self, artifact_id: &str) -> Result<bool, LifecycleError> {
        let Some(lease) = self
            .store
            .try_begin_recreation(artifact_id, self.recreation_lease)
            .await?
        else {
            info!(artifact_id, "Recreation already in flight");
            return Ok(false);
        };

        let event = JobEvent::Recreation(RecreationRequest {
            artifact_id: artifact_id.to_string(),
            lease: lease.clone(),
        });
        if let Err(e) = self.dispatcher.send(event).await {
            warn!(artifact_id, error = %e, "Dispatch failed, releasing recreation lease");
            self.store.clear_recreation(artifact_id, &lease).await?;
            return Err(e.into());
        }

        RECREATIONS.with_label_values(&["dispatched"]).inc();
        info!(artifact_id, "Recreation dispatched");
        Ok(true)
    }
}
