//! Recursive file snapshot of a sandbox
//!
//! Walks the sandbox from its working directory and reads every file that is
//! not build output, dependency caches or shell dotfiles.

use tracing::warn;

use super::{EntryKind, Sandbox, SandboxError};
use crate::agent::FileSet;

/// Directory names never descended into
pub const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    ".next",
    "dist",
    "build",
    "prisma",
    "generated",
    "nextjs-app",
    "ui",
];

/// File names never collected
pub const SKIP_FILES: &[&str] = &[
    ".DS_Store",
    "Thumbs.db",
    "favicon.ico",
    ".bash_logout",
    ".bashrc",
    ".profile",
    ".wh.nextjs-app",
    "package-lock.json",
];

/// Collect every relevant file below the working directory.
///
/// Keys are relative paths (`app/page.tsx`). Files that cannot be read are
/// logged and skipped; a directory that cannot be listed fails the snapshot.
pub async fn collect_files(sandbox: &dyn Sandbox) -> Result<FileSet, SandboxError> {
    let mut files = FileSet::new();
    let mut pending = vec![".".to_string()];

    while let Some(dir) = pending.pop() {
        for entry in sandbox.list(&dir, false).await? {
            if SKIP_DIRS.contains(&entry.name.as_str()) || SKIP_FILES.contains(&entry.name.as_str()) {
                continue;
            }
            let path = if dir == "." {
                entry.name.clone()
            } else {
                format!("{dir}/{}", entry.name)
            };
            match entry.kind {
                EntryKind::File => match sandbox.read_file(&path).await {
                    Ok(content) => files.insert(path, content),
                    Err(e) => warn!(path = %path, error = %e, "Could not read file for snapshot"),
                },
                EntryKind::Dir => pending.push(path),
            }
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{MemorySandboxProvider, SandboxProvider};

    #[tokio::test]
    async fn test_collect_skips_caches_and_dotfiles() {
        let template = FileSet::from_iter([
            ("app/page.tsx", "page"),
            ("app/components/card.tsx", "card"),
            ("package.json", "{}"),
            ("package-lock.json", "{}"),
            (".bashrc", "alias"),
            ("node_modules/react/index.js", "react"),
            ("components/ui/button.tsx", "shadcn"),
        ]);
        let provider = MemorySandboxProvider::new().with_template_files(template);
        let id = provider.create("base").await.unwrap();
        let sandbox = provider.connect(&id).await.unwrap();

        let files = collect_files(sandbox.as_ref()).await.unwrap();
        let paths: Vec<_> = files.paths().collect();
        assert_eq!(
            paths,
            vec!["app/components/card.tsx", "app/page.tsx", "package.json"]
        );
    }
}
