//! Remote sandbox capability
//!
//! A sandbox is an ephemeral remote environment exposing a filesystem, a
//! command runner and an externally reachable host. The engine treats it as
//! opaque: everything goes through the [`Sandbox`] trait.
//!
//! # Architecture
//!
//! ```text
//! GenerationJob / RecreationJob
//!          │
//!          ▼
//!   SandboxProvider.create(template) ──► sandbox id
//!          │
//!          ▼
//!   SandboxProvider.connect(id) ──► Arc<dyn Sandbox>
//!          │
//!          ├── read_file / write_file / make_dir / list
//!          ├── run_command (stdout/stderr streamed to a callback)
//!          └── host(port) ──► preview URL
//! ```
//!
//! Providers:
//! - [`HttpSandboxProvider`] talks to a sandbox control API over HTTP
//! - [`MemorySandboxProvider`] keeps everything in process (tests, dry runs)

pub mod handle;
pub mod http;
pub mod memory;
pub mod probe;
pub mod snapshot;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use handle::SandboxHandle;
pub use http::HttpSandboxProvider;
pub use memory::{MemorySandbox, MemorySandboxProvider};
pub use probe::{HealthProbe, HttpProbe};
pub use snapshot::collect_files;

/// Error type for sandbox operations
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("sandbox {0} does not exist")]
    UnknownSandbox(String),
    #[error("sandbox request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("sandbox API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid sandbox response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// A single directory entry returned by [`Sandbox::list`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

/// A chunk of command output delivered while the command runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(String),
    Stderr(String),
}

/// Final result of a command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, when the sandbox reports one
    pub exit_code: Option<i32>,
}

/// One connected remote execution environment
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Provider-assigned sandbox id
    fn id(&self) -> &str;

    /// Read a file; fails with [`SandboxError::NotFound`] when absent
    async fn read_file(&self, path: &str) -> Result<String, SandboxError>;

    /// Create or overwrite a file
    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError>;

    /// Create a directory and its parents
    async fn make_dir(&self, path: &str) -> Result<(), SandboxError>;

    /// List a directory, optionally descending into subdirectories
    async fn list(&self, path: &str, recursive: bool) -> Result<Vec<EntryInfo>, SandboxError>;

    /// Run a shell command, streaming output chunks to `on_output`
    async fn run_command(
        &self,
        command: &str,
        on_output: &mut (dyn FnMut(OutputChunk) + Send),
    ) -> Result<CommandOutput, SandboxError>;

    /// Externally reachable hostname for a port inside the sandbox
    fn host(&self, port: u16) -> String;

    /// Extend the sandbox lifetime
    async fn set_timeout(&self, timeout: Duration) -> Result<(), SandboxError>;
}

/// Creates and connects sandboxes
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Create a sandbox from a template, returning its id
    async fn create(&self, template_id: &str) -> Result<String, SandboxError>;

    /// Connect to an existing sandbox
    async fn connect(&self, sandbox_id: &str) -> Result<Arc<dyn Sandbox>, SandboxError>;
}

/// Working directory that relative sandbox paths resolve against
pub const WORKDIR: &str = "/home/user";

/// Canonical spelling of a sandbox path.
///
/// Paths below [`WORKDIR`] become relative (`/home/user/app/page.tsx` and
/// `./app/page.tsx` both give `app/page.tsx`); other absolute paths are kept.
/// Trailing slashes are dropped and the working directory itself is `""`.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim_end_matches('/');
    if path == WORKDIR {
        return String::new();
    }
    let mut path = path
        .strip_prefix(WORKDIR)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path);
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    if path == "." {
        String::new()
    } else {
        path.to_string()
    }
}

/// Parent directory of a sandbox path, if it has one
pub(crate) fn parent_dir(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let (parent, _) = trimmed.rsplit_once('/')?;
    if parent.is_empty() || parent == "." {
        None
    } else {
        Some(parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("app/page.tsx"), Some("app"));
        assert_eq!(parent_dir("/home/user/app/page.tsx"), Some("/home/user/app"));
        assert_eq!(parent_dir("page.tsx"), None);
        assert_eq!(parent_dir("./page.tsx"), None);
        assert_eq!(parent_dir("/page.tsx"), None);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("app/page.tsx"), "app/page.tsx");
        assert_eq!(normalize_path("./app/page.tsx"), "app/page.tsx");
        assert_eq!(normalize_path("/home/user/app/page.tsx"), "app/page.tsx");
        assert_eq!(normalize_path("/home/user/./app/"), "app");
        assert_eq!(normalize_path("/home/user/"), "");
        assert_eq!(normalize_path("."), "");
        assert_eq!(normalize_path("/home/username/x"), "/home/username/x");
        assert_eq!(normalize_path("/tmp/build.log"), "/tmp/build.log");
    }

    #[test]
    fn test_entry_info_wire_format() {
        let entry: EntryInfo =
            serde_json::from_str(r#"{"name":"app","path":"/home/user/app","type":"dir"}"#).unwrap();
        assert_eq!(entry.kind, EntryKind::Dir);
    }
}
