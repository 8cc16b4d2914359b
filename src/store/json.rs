//! In-memory store with optional JSON snapshots
//!
//! All state lives behind one `tokio::sync::Mutex`, so every operation,
//! including the recreation check-and-set, is atomic with respect to every
//! other. When opened with a path, each mutation is applied to a copy of the
//! state, written to that file, and only then swapped in: a failed write
//! leaves the store exactly as it was.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{Artifact, Message, NewMessage, Project, ProjectStore, StoreError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    projects: Vec<Project>,
    /// Insertion order, oldest first
    messages: Vec<Message>,
    artifacts: Vec<Artifact>,
}

impl Snapshot {
    fn artifact(&self, id: &str) -> Result<&Artifact, StoreError> {
        self.artifacts
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::artifact(id))
    }

    fn artifact_mut(&mut self, id: &str) -> Result<&mut Artifact, StoreError> {
        self.artifacts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::artifact(id))
    }
}

pub struct JsonStore {
    state: Mutex<Snapshot>,
    path: Option<PathBuf>,
}

impl JsonStore {
    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(Snapshot::default()),
            path: None,
        }
    }

    /// Open a file-backed store, loading the snapshot if it exists
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = match tokio::fs::read_to_string(&path).await {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!(
            path = %path.display(),
            projects = snapshot.projects.len(),
            messages = snapshot.messages.len(),
            "Opened store"
        );
        Ok(Self {
            state: Mutex::new(snapshot),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Apply `change` to a copy of `state`, persist it, then swap it in
    async fn commit<T>(
        &self,
        state: &mut Snapshot,
        change: impl FnOnce(&mut Snapshot) -> Result<T, StoreError> + Send,
    ) -> Result<T, StoreError> {
        let mut next = state.clone();
        let out = change(&mut next)?;
        self.persist(&next).await?;
        *state = next;
        Ok(out)
    }
}

#[async_trait]
impl ProjectStore for JsonStore {
    async fn create_project(&self, name: &str) -> Result<Project, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let project = Project {
            id: Uuid::now_v7().to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.commit(&mut state, |next| {
            next.projects.push(project.clone());
            Ok(())
        })
        .await?;
        Ok(project)
    }

    async fn find_project(&self, id: &str) -> Result<Option<Project>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.projects.iter().find(|p| p.id == id).cloned())
    }

    async fn create_message(&self, message: NewMessage) -> Result<(Message, Option<Artifact>), StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let message_id = Uuid::now_v7().to_string();
        let artifact = message.artifact.map(|new| Artifact {
            id: Uuid::now_v7().to_string(),
            message_id: message_id.clone(),
            sandbox_url: new.sandbox_url,
            title: new.title,
            files: new.files,
            is_recreating: false,
            recreation_started_at: None,
            recreation_lease: None,
            created_at: now,
            updated_at: now,
        });

        let stored = Message {
            id: message_id,
            project_id: message.project_id,
            role: message.role,
            kind: message.kind,
            content: message.content,
            artifact_id: artifact.as_ref().map(|a| a.id.clone()),
            created_at: now,
        };

        self.commit(&mut state, |next| {
            let project = next
                .projects
                .iter_mut()
                .find(|p| p.id == stored.project_id)
                .ok_or_else(|| StoreError::project(&stored.project_id))?;
            project.updated_at = now;
            next.messages.push(stored.clone());
            if let Some(artifact) = &artifact {
                next.artifacts.push(artifact.clone());
            }
            Ok(())
        })
        .await?;
        Ok((stored, artifact))
    }

    async fn recent_messages(&self, project_id: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .iter()
            .rev()
            .filter(|m| m.project_id == project_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_artifact(&self, id: &str) -> Result<Option<Artifact>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.artifacts.iter().find(|a| a.id == id).cloned())
    }

    async fn try_begin_recreation(&self, id: &str, lease: Duration) -> Result<Option<String>, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        if state.artifact(id)?.lease_active(lease, now) {
            return Ok(None);
        }
        let token = Uuid::now_v7().to_string();
        self.commit(&mut state, |next| {
            let artifact = next.artifact_mut(id)?;
            artifact.is_recreating = true;
            artifact.recreation_started_at = Some(now);
            artifact.recreation_lease = Some(token.clone());
            artifact.updated_at = now;
            Ok(())
        })
        .await?;
        Ok(Some(token))
    }

    async fn complete_recreation(&self, id: &str, lease: &str, sandbox_url: &str) -> Result<Artifact, StoreError> {
        let mut state = self.state.lock().await;
        if !state.artifact(id)?.holds_lease(lease) {
            return Err(StoreError::LeaseLost { id: id.to_string() });
        }
        self.commit(&mut state, |next| {
            let artifact = next.artifact_mut(id)?;
            artifact.sandbox_url = sandbox_url.to_string();
            release(artifact);
            Ok(artifact.clone())
        })
        .await
    }

    async fn clear_recreation(&self, id: &str, lease: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if !state.artifact(id)?.holds_lease(lease) {
            debug!(artifact_id = id, "Recreation lease already replaced, leaving it");
            return Ok(false);
        }
        self.commit(&mut state, |next| {
            release(next.artifact_mut(id)?);
            Ok(true)
        })
        .await
    }
}

fn release(artifact: &mut Artifact) {
    artifact.is_recreating = false;
    artifact.recreation_started_at = None;
    artifact.recreation_lease = None;
    artifact.updated_at = Utc::now();
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::agent::FileSet;
    use crate::store::{MessageKind, MessageRole, NewArtifact};

    async fn project_with_artifact(store: &JsonStore) -> (Project, Artifact) {
        let project = store.create_project("todo-app").await.unwrap();
        let (_, artifact) = store
            .create_message(NewMessage::result(
                &project.id,
                "Here you go",
                NewArtifact {
                    sandbox_url: "https://3000-a.sandbox.local".into(),
                    title: "Todo App".into(),
                    files: FileSet::from_iter([("app/page.tsx", "x")]),
                },
            ))
            .await
            .unwrap();
        (project, artifact.unwrap())
    }

    #[tokio::test]
    async fn test_recent_messages_newest_first() {
        let store = JsonStore::in_memory();
        let project = store.create_project("p").await.unwrap();
        for i in 0..5 {
            store
                .create_message(NewMessage::user(&project.id, format!("msg {i}")))
                .await
                .unwrap();
        }

        let recent = store.recent_messages(&project.id, 3).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 4", "msg 3", "msg 2"]);
    }

    #[tokio::test]
    async fn test_message_for_unknown_project_fails() {
        let store = JsonStore::in_memory();
        let err = store
            .create_message(NewMessage::user("nope", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "project", .. }));
    }

    #[tokio::test]
    async fn test_result_message_links_artifact() {
        let store = JsonStore::in_memory();
        let (project, artifact) = project_with_artifact(&store).await;
        let recent = store.recent_messages(&project.id, 1).await.unwrap();
        assert_eq!(recent[0].role, MessageRole::Assistant);
        assert_eq!(recent[0].kind, MessageKind::Result);
        assert_eq!(recent[0].artifact_id.as_deref(), Some(artifact.id.as_str()));
        assert_eq!(artifact.message_id, recent[0].id);
    }

    #[tokio::test]
    async fn test_recreation_lease_is_exclusive() {
        let store = Arc::new(JsonStore::in_memory());
        let (_, artifact) = project_with_artifact(&store).await;
        let lease = Duration::from_secs(300);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let id = artifact.id.clone();
            handles.push(tokio::spawn(async move {
                store.try_begin_recreation(&id, lease).await.unwrap()
            }));
        }
        let mut tokens = Vec::new();
        for handle in handles {
            if let Some(token) = handle.await.unwrap() {
                tokens.push(token);
            }
        }
        assert_eq!(tokens.len(), 1);

        assert!(store.clear_recreation(&artifact.id, &tokens[0]).await.unwrap());
        assert!(store.try_begin_recreation(&artifact.id, lease).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_reacquired() {
        let store = JsonStore::in_memory();
        let (_, artifact) = project_with_artifact(&store).await;
        let first = store.try_begin_recreation(&artifact.id, Duration::ZERO).await.unwrap();
        let second = store.try_begin_recreation(&artifact.id, Duration::ZERO).await.unwrap();
        assert!(first.is_some() && second.is_some());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_complete_recreation_updates_url_and_clears_flag() {
        let store = JsonStore::in_memory();
        let (_, artifact) = project_with_artifact(&store).await;
        let token = store
            .try_begin_recreation(&artifact.id, Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        let updated = store
            .complete_recreation(&artifact.id, &token, "https://3000-b.sandbox.local")
            .await
            .unwrap();
        assert_eq!(updated.sandbox_url, "https://3000-b.sandbox.local");
        assert!(!updated.is_recreating);
        assert!(updated.recreation_lease.is_none());
        assert!(updated.updated_at >= artifact.updated_at);
    }

    #[tokio::test]
    async fn test_stale_lease_cannot_release_or_complete() {
        let store = JsonStore::in_memory();
        let (_, artifact) = project_with_artifact(&store).await;
        let stale = store
            .try_begin_recreation(&artifact.id, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        let current = store
            .try_begin_recreation(&artifact.id, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();

        assert!(!store.clear_recreation(&artifact.id, &stale).await.unwrap());
        let err = store
            .complete_recreation(&artifact.id, &stale, "https://3000-old.sandbox.local")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LeaseLost { .. }));

        let stored = store.find_artifact(&artifact.id).await.unwrap().unwrap();
        assert!(stored.is_recreating);
        assert_eq!(stored.recreation_lease.as_deref(), Some(current.as_str()));
        assert_eq!(stored.sandbox_url, artifact.sandbox_url);

        assert!(store.clear_recreation(&artifact.id, &current).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        let store = JsonStore::open(state_dir.join("store.json")).await.unwrap();
        let (project, artifact) = project_with_artifact(&store).await;

        std::fs::remove_dir_all(&state_dir).unwrap();

        let err = store
            .try_begin_recreation(&artifact.id, Duration::from_secs(300))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        let stored = store.find_artifact(&artifact.id).await.unwrap().unwrap();
        assert!(!stored.is_recreating);
        assert!(stored.recreation_lease.is_none());

        assert!(store
            .create_message(NewMessage::user(&project.id, "again"))
            .await
            .is_err());
        assert_eq!(store.recent_messages(&project.id, 10).await.unwrap().len(), 1);

        assert!(store.create_project("other").await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("store.json");

        let artifact_id = {
            let store = JsonStore::open(&path).await.unwrap();
            let (_, artifact) = project_with_artifact(&store).await;
            artifact.id
        };

        let reopened = JsonStore::open(&path).await.unwrap();
        let artifact = reopened.find_artifact(&artifact_id).await.unwrap().unwrap();
        assert_eq!(artifact.title, "Todo App");
        assert_eq!(artifact.files.get("app/page.tsx"), Some("x"));
    }

    #[tokio::test]
    async fn test_unknown_artifact_recreation_is_not_found() {
        let store = JsonStore::in_memory();
        let err = store
            .try_begin_recreation("missing", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "artifact", .. }));
    }
}
