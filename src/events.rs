//! Event dispatch between the front end, jobs and the lifecycle manager
//!
//! Events are fire-and-forget: `send` returns once the event is queued, not
//! when the job it triggers has finished. On the wire an event is
//! `{"name": "...", "data": {...}}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Payload of a `code-agent/run` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Natural-language build request
    pub content: String,
    pub project_id: String,
    /// Artifact to extend instead of the project's newest one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_artifact_id: Option<String>,
}

/// Payload of a `sandbox/recreate` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecreationRequest {
    pub artifact_id: String,
    /// Lease token minted when the recreation flag was set
    pub lease: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum JobEvent {
    #[serde(rename = "code-agent/run")]
    Generation(GenerationRequest),
    #[serde(rename = "sandbox/recreate")]
    Recreation(RecreationRequest),
}

impl JobEvent {
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::Generation(_) => "code-agent/run",
            JobEvent::Recreation(_) => "sandbox/recreate",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("event queue is closed")]
    Closed,
}

/// Event dispatch collaborator
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn send(&self, event: JobEvent) -> Result<(), DispatchError>;
}

/// Dispatcher backed by a bounded tokio channel, drained by the job worker
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::Sender<JobEvent>,
}

impl ChannelDispatcher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<JobEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventDispatcher for ChannelDispatcher {
    async fn send(&self, event: JobEvent) -> Result<(), DispatchError> {
        debug!(event = event.name(), "Dispatching event");
        self.tx.send(event).await.map_err(|_| DispatchError::Closed)
    }
}
