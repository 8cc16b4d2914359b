//! In-process sandbox provider
//!
//! Keeps each sandbox's filesystem in memory and answers commands through a
//! pluggable handler. Used for dry runs (`sandbox.provider = "memory"`) and
//! throughout the test suite, where its failure switches simulate a remote
//! environment going bad half-way through a job.
//!
//! Paths are resolved against the working directory `/home/user`, so
//! `app/page.tsx`, `./app/page.tsx` and `/home/user/app/page.tsx` name the
//! same file.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    normalize_path, CommandOutput, EntryInfo, EntryKind, OutputChunk, Sandbox, SandboxError,
    SandboxProvider,
};
use crate::agent::FileSet;

/// Handler answering `run_command` calls
pub type CommandHandler =
    Arc<dyn Fn(&str) -> Result<CommandOutput, SandboxError> + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Storage key: the canonical path, rooted at the working directory
fn normalize(path: &str) -> String {
    normalize_path(path).trim_start_matches('/').to_string()
}

fn default_handler() -> CommandHandler {
    Arc::new(|_| {
        Ok(CommandOutput {
            exit_code: Some(0),
            ..CommandOutput::default()
        })
    })
}

/// One in-memory sandbox
pub struct MemorySandbox {
    id: String,
    host_domain: String,
    files: Mutex<BTreeMap<String, String>>,
    dirs: Mutex<BTreeSet<String>>,
    command_handler: CommandHandler,
    fail_writes: AtomicBool,
    timeout: Mutex<Option<Duration>>,
}

impl MemorySandbox {
    fn new(id: String, host_domain: String, files: &FileSet, command_handler: CommandHandler) -> Self {
        let files = files
            .iter()
            .map(|(p, c)| (normalize(p), c.to_string()))
            .collect();
        Self {
            id,
            host_domain,
            files: Mutex::new(files),
            dirs: Mutex::new(BTreeSet::new()),
            command_handler,
            fail_writes: AtomicBool::new(false),
            timeout: Mutex::new(None),
        }
    }

    /// Snapshot of every file currently stored, keyed by normalized path
    pub fn files(&self) -> FileSet {
        lock(&self.files).iter().map(|(p, c)| (p.clone(), c.clone())).collect()
    }

    /// Last lifetime set through [`Sandbox::set_timeout`]
    pub fn timeout(&self) -> Option<Duration> {
        *lock(&self.timeout)
    }

    /// Make every subsequent write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn entries(&self, base: &str, recursive: bool) -> Vec<EntryInfo> {
        let files = lock(&self.files);
        let dirs = lock(&self.dirs);
        let prefix = if base.is_empty() {
            String::new()
        } else {
            format!("{base}/")
        };

        let mut found: BTreeMap<String, EntryKind> = BTreeMap::new();
        let mut visit = |path: &str, kind: EntryKind| {
            let Some(rest) = path.strip_prefix(prefix.as_str()) else {
                return;
            };
            if rest.is_empty() {
                return;
            }
            let components: Vec<&str> = rest.split('/').collect();
            let depth = if recursive { components.len() } else { 1 };
            for i in 0..depth {
                let child = format!("{prefix}{}", components[..=i].join("/"));
                let child_kind = if i + 1 == components.len() {
                    kind
                } else {
                    EntryKind::Dir
                };
                found.entry(child).or_insert(child_kind);
            }
        };

        for path in files.keys() {
            visit(path, EntryKind::File);
        }
        for dir in dirs.iter() {
            visit(dir, EntryKind::Dir);
        }

        found
            .into_iter()
            .map(|(path, kind)| EntryInfo {
                name: path.rsplit('/').next().unwrap_or(&path).to_string(),
                path,
                kind,
            })
            .collect()
    }

    fn is_dir(&self, path: &str) -> bool {
        if path.is_empty() || lock(&self.dirs).contains(path) {
            return true;
        }
        let prefix = format!("{path}/");
        lock(&self.files).keys().any(|p| p.starts_with(&prefix))
    }
}

#[async_trait]
impl Sandbox for MemorySandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        lock(&self.files)
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| SandboxError::NotFound(path.to_string()))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SandboxError::Other(format!("write rejected for {path}")));
        }
        let key = normalize(path);
        if key.is_empty() {
            return Err(SandboxError::Other(format!("invalid file path: {path:?}")));
        }
        lock(&self.files).insert(key, content.to_string());
        Ok(())
    }

    async fn make_dir(&self, path: &str) -> Result<(), SandboxError> {
        let key = normalize(path);
        if !key.is_empty() {
            lock(&self.dirs).insert(key);
        }
        Ok(())
    }

    async fn list(&self, path: &str, recursive: bool) -> Result<Vec<EntryInfo>, SandboxError> {
        let base = normalize(path);
        if !self.is_dir(&base) {
            return Err(SandboxError::NotFound(path.to_string()));
        }
        Ok(self.entries(&base, recursive))
    }

    async fn run_command(
        &self,
        command: &str,
        on_output: &mut (dyn FnMut(OutputChunk) + Send),
    ) -> Result<CommandOutput, SandboxError> {
        let output = (self.command_handler)(command)?;
        if !output.stdout.is_empty() {
            on_output(OutputChunk::Stdout(output.stdout.clone()));
        }
        if !output.stderr.is_empty() {
            on_output(OutputChunk::Stderr(output.stderr.clone()));
        }
        Ok(output)
    }

    fn host(&self, port: u16) -> String {
        format!("{port}-{}.{}", self.id, self.host_domain)
    }

    async fn set_timeout(&self, timeout: Duration) -> Result<(), SandboxError> {
        *lock(&self.timeout) = Some(timeout);
        Ok(())
    }
}

/// Provider handing out [`MemorySandbox`] instances
pub struct MemorySandboxProvider {
    sandboxes: Mutex<HashMap<String, Arc<MemorySandbox>>>,
    host_domain: String,
    template_files: FileSet,
    command_handler: CommandHandler,
    fail_create: AtomicBool,
    fail_writes: AtomicBool,
    created: AtomicUsize,
}

impl MemorySandboxProvider {
    pub fn new() -> Self {
        Self {
            sandboxes: Mutex::new(HashMap::new()),
            host_domain: "sandbox.local".to_string(),
            template_files: FileSet::new(),
            command_handler: default_handler(),
            fail_create: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            created: AtomicUsize::new(0),
        }
    }

    /// Domain used when building preview hosts
    pub fn with_host_domain(mut self, domain: impl Into<String>) -> Self {
        self.host_domain = domain.into();
        self
    }

    /// Files every new sandbox starts with
    pub fn with_template_files(mut self, files: FileSet) -> Self {
        self.template_files = files;
        self
    }

    /// Answer commands with `handler` instead of the default no-op
    pub fn with_command_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) -> Result<CommandOutput, SandboxError> + Send + Sync + 'static,
    {
        self.command_handler = Arc::new(handler);
        self
    }

    /// Make `create` fail
    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make writes fail in sandboxes created from now on
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Look up a sandbox created by this provider
    pub fn sandbox(&self, id: &str) -> Option<Arc<MemorySandbox>> {
        lock(&self.sandboxes).get(id).cloned()
    }

    /// Number of sandboxes created so far
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl Default for MemorySandboxProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SandboxProvider for MemorySandboxProvider {
    async fn create(&self, template_id: &str) -> Result<String, SandboxError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(SandboxError::Other(format!(
                "template {template_id} could not be started"
            )));
        }
        let id = format!("sbx-{}", Uuid::now_v7().simple());
        let sandbox = MemorySandbox::new(
            id.clone(),
            self.host_domain.clone(),
            &self.template_files,
            self.command_handler.clone(),
        );
        sandbox.set_fail_writes(self.fail_writes.load(Ordering::SeqCst));
        lock(&self.sandboxes).insert(id.clone(), Arc::new(sandbox));
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn connect(&self, sandbox_id: &str) -> Result<Arc<dyn Sandbox>, SandboxError> {
        let sandbox: Arc<dyn Sandbox> = self
            .sandbox(sandbox_id)
            .ok_or_else(|| SandboxError::UnknownSandbox(sandbox_id.to_string()))?;
        Ok(sandbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sandbox() -> Arc<dyn Sandbox> {
        let provider = MemorySandboxProvider::new();
        let id = provider.create("base").await.unwrap();
        provider.connect(&id).await.unwrap()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("app/page.tsx"), "app/page.tsx");
        assert_eq!(normalize("./app/page.tsx"), "app/page.tsx");
        assert_eq!(normalize("/home/user/app/page.tsx"), "app/page.tsx");
        assert_eq!(normalize("/home/user"), "");
        assert_eq!(normalize("."), "");
        assert_eq!(normalize("/home/username/x"), "home/username/x");
    }

    #[tokio::test]
    async fn test_write_then_read_across_path_spellings() {
        let sbx = sandbox().await;
        sbx.write_file("app/page.tsx", "export default 1").await.unwrap();
        let content = sbx.read_file("/home/user/app/page.tsx").await.unwrap();
        assert_eq!(content, "export default 1");
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let sbx = sandbox().await;
        let err = sbx.read_file("missing.txt").await.unwrap_err();
        assert!(matches!(err, SandboxError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_shallow_and_recursive() {
        let sbx = sandbox().await;
        sbx.write_file("app/page.tsx", "a").await.unwrap();
        sbx.write_file("app/ui/button.tsx", "b").await.unwrap();
        sbx.write_file("package.json", "{}").await.unwrap();

        let shallow = sbx.list(".", false).await.unwrap();
        let names: Vec<_> = shallow.iter().map(|e| (e.name.as_str(), e.kind)).collect();
        assert_eq!(names, vec![("app", EntryKind::Dir), ("package.json", EntryKind::File)]);

        let deep = sbx.list("app", true).await.unwrap();
        let paths: Vec<_> = deep.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["app/page.tsx", "app/ui", "app/ui/button.tsx"]);
    }

    #[tokio::test]
    async fn test_list_missing_directory_fails() {
        let sbx = sandbox().await;
        assert!(sbx.list("nope", false).await.is_err());
    }

    #[tokio::test]
    async fn test_command_handler_streams_output() {
        let provider = MemorySandboxProvider::new().with_command_handler(|cmd| {
            Ok(CommandOutput {
                stdout: format!("ran {cmd}"),
                stderr: String::new(),
                exit_code: Some(0),
            })
        });
        let id = provider.create("base").await.unwrap();
        let sbx = provider.connect(&id).await.unwrap();

        let mut chunks = Vec::new();
        let output = sbx
            .run_command("ls", &mut |chunk| chunks.push(chunk))
            .await
            .unwrap();
        assert_eq!(output.stdout, "ran ls");
        assert_eq!(chunks, vec![OutputChunk::Stdout("ran ls".to_string())]);
    }

    #[tokio::test]
    async fn test_fail_writes_applies_to_new_sandboxes() {
        let provider = MemorySandboxProvider::new();
        provider.set_fail_writes(true);
        let id = provider.create("base").await.unwrap();
        let sbx = provider.connect(&id).await.unwrap();
        assert!(sbx.write_file("a.txt", "x").await.is_err());
    }
}
