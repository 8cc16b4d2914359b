//! Conversation seeding from a project's stored history
//!
//! Storage hands messages back newest first. The loop needs them oldest
//! first, plus the files of the most recent artifact so a follow-up request
//! extends the previous result instead of starting empty.

use tracing::debug;

use super::state::{ConversationMessage, FileSet};
use crate::store::{Message, MessageRole, ProjectStore, StoreError};

/// Prior context for one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Seed {
    /// Chronological prior conversation
    pub messages: Vec<ConversationMessage>,
    /// Files of the artifact being extended (empty when there is none)
    pub files: FileSet,
    pub artifact_id: Option<String>,
}

/// Convert a newest-first page of stored messages into chronological order
pub fn chronological(newest_first: &[Message]) -> Vec<ConversationMessage> {
    newest_first
        .iter()
        .rev()
        .map(|m| match m.role {
            MessageRole::User => ConversationMessage::user(m.content.clone()),
            MessageRole::Assistant => ConversationMessage::assistant(m.content.clone()),
        })
        .collect()
}

/// Artifact id of the newest assistant message that carries one
pub fn latest_artifact_id(newest_first: &[Message]) -> Option<&str> {
    newest_first
        .iter()
        .find(|m| m.role == MessageRole::Assistant && m.artifact_id.is_some())
        .and_then(|m| m.artifact_id.as_deref())
}

/// Load the seed for a request in `project_id`.
///
/// The request itself is usually recorded before the job runs; when the
/// newest stored message is that same user message it is left out so the
/// loop does not see the request twice. `prior_artifact_id` overrides the
/// newest-first artifact scan.
pub async fn load_seed(
    store: &dyn ProjectStore,
    project_id: &str,
    request: &str,
    history_limit: usize,
    prior_artifact_id: Option<&str>,
) -> Result<Seed, StoreError> {
    let mut recent = store.recent_messages(project_id, history_limit + 1).await?;
    if recent
        .first()
        .is_some_and(|m| m.role == MessageRole::User && m.content == request)
    {
        recent.remove(0);
    }
    recent.truncate(history_limit);

    let artifact_id = prior_artifact_id
        .map(str::to_string)
        .or_else(|| latest_artifact_id(&recent).map(str::to_string));

    let files = match &artifact_id {
        Some(id) => match store.find_artifact(id).await? {
            Some(artifact) => artifact.files,
            None => {
                debug!(artifact_id = %id, "Prior artifact not found, starting empty");
                FileSet::new()
            }
        },
        None => FileSet::new(),
    };

    debug!(
        project_id,
        messages = recent.len(),
        prior_files = files.len(),
        "Loaded conversation seed"
    );

    Ok(Seed {
        messages: chronological(&recent),
        files,
        artifact_id,
    })
}
