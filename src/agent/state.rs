//! Run state for a single agent execution
//!
//! An `AgentRunState` is owned by exactly one run. Tool handlers never touch
//! it directly; they hand back a `FileSet` delta which the loop merges with
//! [`AgentRunState::apply`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sandbox::normalize_path;

/// Role of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of the chronological conversation transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Mapping of sandbox path to file content
///
/// Keys are unique, ordered and stored in canonical form
/// ([`normalize_path`]), so every spelling of one sandbox file maps to one
/// entry. Merging overwrites on conflict: the incoming content always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>")]
pub struct FileSet(BTreeMap<String, String>);

impl From<BTreeMap<String, String>> for FileSet {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a single path
    pub fn insert(&mut self, path: impl AsRef<str>, content: impl Into<String>) {
        self.0.insert(normalize_path(path.as_ref()), content.into());
    }

    /// Merge `other` into `self`, `other` winning on conflicting paths
    pub fn merge(&mut self, other: FileSet) {
        for (path, content) in other.0 {
            self.insert(path, content);
        }
    }

    /// Non-consuming variant of [`FileSet::merge`]
    pub fn merged(mut self, other: FileSet) -> FileSet {
        self.merge(other);
        self
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(&normalize_path(path)).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(&normalize_path(path))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }
}

impl<P: AsRef<str>, C: Into<String>> FromIterator<(P, C)> for FileSet {
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        let mut files = FileSet::new();
        for (path, content) in iter {
            files.insert(path, content);
        }
        files
    }
}

impl IntoIterator for FileSet {
    type Item = (String, String);
    type IntoIter = std::collections::btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Mutable state of one agent run
#[derive(Debug, Clone, Default)]
pub struct AgentRunState {
    /// Terminal summary; empty until the first terminal signal
    pub summary: String,
    /// Working file set (seeded with prior files, then grown by tool calls)
    pub files: FileSet,
    /// Chronological transcript
    pub messages: Vec<ConversationMessage>,
    /// Number of model calls made so far
    pub iteration_count: usize,
}

impl AgentRunState {
    /// Create run state seeded with files from a previous artifact
    pub fn seeded(files: FileSet) -> Self {
        Self {
            files,
            ..Self::default()
        }
    }

    /// Merge a tool's file delta into the working set
    pub fn apply(&mut self, delta: FileSet) {
        self.files.merge(delta);
    }

    /// Record the terminal summary.
    ///
    /// Returns `false` and leaves the state untouched when a summary was
    /// already recorded in this run.
    pub fn record_summary(&mut self, text: impl Into<String>) -> bool {
        if !self.summary.is_empty() {
            return false;
        }
        self.summary = text.into();
        true
    }

    pub fn push_message(&mut self, message: ConversationMessage) {
        self.messages.push(message);
    }
}
