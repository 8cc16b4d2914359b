//! Persistence of projects, messages and artifacts
//!
//! The engine only needs a handful of operations from its persistence
//! collaborator, captured by [`ProjectStore`]. The recreation flag on an
//! [`Artifact`] is only ever acquired through
//! [`ProjectStore::try_begin_recreation`], a conditional update that succeeds
//! for exactly one caller while the lease is held.
//!
//! [`JsonStore`] keeps everything in memory behind a single lock and can
//! snapshot to a JSON file after every write.

pub mod json;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::FileSet;

pub use json::JsonStore;

/// Error type for persistence operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store snapshot is invalid: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("recreation lease on artifact {id} is no longer held")]
    LeaseLost { id: String },
}

impl StoreError {
    pub fn artifact(id: &str) -> Self {
        StoreError::NotFound {
            kind: "artifact",
            id: id.to_string(),
        }
    }

    pub fn project(id: &str) -> Self {
        StoreError::NotFound {
            kind: "project",
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Result,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub project_id: String,
    pub role: MessageRole,
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Persisted output of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    pub message_id: String,
    pub sandbox_url: String,
    pub title: String,
    pub files: FileSet,
    pub is_recreating: bool,
    /// When the current recreation lease was taken
    #[serde(default)]
    pub recreation_started_at: Option<DateTime<Utc>>,
    /// Token of the job holding the recreation lease
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recreation_lease: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Artifact {
    /// Whether a recreation lease is held and has not expired
    pub fn lease_active(&self, lease: Duration, now: DateTime<Utc>) -> bool {
        if !self.is_recreating {
            return false;
        }
        match (self.recreation_started_at, chrono::Duration::from_std(lease)) {
            (Some(started), Ok(lease)) => now < started + lease,
            // A flag without a start time can never expire on its own
            (None, _) => true,
            (Some(_), Err(_)) => true,
        }
    }
}

impl Artifact {
    /// Whether `lease` is the token of the recreation currently in flight
    pub fn holds_lease(&self, lease: &str) -> bool {
        self.is_recreating && self.recreation_lease.as_deref() == Some(lease)
    }
}

/// Artifact attached to a new RESULT message
#[derive(Debug, Clone, PartialEq)]
pub struct NewArtifact {
    pub sandbox_url: String,
    pub title: String,
    pub files: FileSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub project_id: String,
    pub role: MessageRole,
    pub kind: MessageKind,
    pub content: String,
    pub artifact: Option<NewArtifact>,
}

impl NewMessage {
    pub fn user(project_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            role: MessageRole::User,
            kind: MessageKind::Result,
            content: content.into(),
            artifact: None,
        }
    }

    pub fn result(project_id: impl Into<String>, content: impl Into<String>, artifact: NewArtifact) -> Self {
        Self {
            project_id: project_id.into(),
            role: MessageRole::Assistant,
            kind: MessageKind::Result,
            content: content.into(),
            artifact: Some(artifact),
        }
    }

    pub fn error(project_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            role: MessageRole::Assistant,
            kind: MessageKind::Error,
            content: content.into(),
            artifact: None,
        }
    }
}

/// Persistence collaborator used by jobs, the lifecycle manager and the server
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create_project(&self, name: &str) -> Result<Project, StoreError>;

    async fn find_project(&self, id: &str) -> Result<Option<Project>, StoreError>;

    /// Append a message, creating its artifact in the same write
    async fn create_message(&self, message: NewMessage) -> Result<(Message, Option<Artifact>), StoreError>;

    /// Up to `limit` most recent messages of a project, newest first
    async fn recent_messages(&self, project_id: &str, limit: usize) -> Result<Vec<Message>, StoreError>;

    async fn find_artifact(&self, id: &str) -> Result<Option<Artifact>, StoreError>;

    /// Set `is_recreating` if no unexpired lease is held.
    ///
    /// Returns the lease token for the single caller that acquired the
    /// lease, `None` for everyone else.
    async fn try_begin_recreation(&self, id: &str, lease: Duration) -> Result<Option<String>, StoreError>;

    /// Store the new sandbox URL and release the lease.
    ///
    /// Fails with [`StoreError::LeaseLost`] unless `lease` is still the
    /// current token.
    async fn complete_recreation(&self, id: &str, lease: &str, sandbox_url: &str) -> Result<Artifact, StoreError>;

    /// Release the lease without touching the URL.
    ///
    /// Returns `false` and changes nothing when `lease` is no longer the
    /// current token.
    async fn clear_recreation(&self, id: &str, lease: &str) -> Result<bool, StoreError>;
}
