//! Tool registry and the sandbox tools offered to the agent
//!
//! Every tool call resolves to exactly one [`ToolResult`]. Handlers never
//! return errors: sandbox failures, timeouts and bad parameters are all
//! folded into `success: false` results the model can read and react to.
//!
//! Handlers do not touch the run state. A tool that writes files hands the
//! written paths back as a [`FileSet`] delta inside its [`ToolOutcome`], and
//! the agent loop merges it.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::state::FileSet;
use crate::metrics::TOOL_CALLS;
use crate::model::{Tool, ToolCall};
use crate::sandbox::{parent_dir, OutputChunk, Sandbox};

/// Default timeout for terminal commands
pub const DEFAULT_TERMINAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-stream cap on command output fed back to the model
const OUTPUT_LIMIT_CHARS: usize = 20_000;

/// Result of a single tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: result.into(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            success: false,
            result: result.into(),
            error: Some(error.into()),
        }
    }

    /// Serialized form appended to the conversation as a tool message
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.result.clone())
    }
}

/// What a handler hands back to the loop
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub result: ToolResult,
    /// Files written by this call, merged into the run's file set
    pub files: FileSet,
}

impl From<ToolResult> for ToolOutcome {
    fn from(result: ToolResult) -> Self {
        Self {
            result,
            files: FileSet::new(),
        }
    }
}

/// A requested tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub parameters: Value,
}

impl From<ToolCall> for ToolInvocation {
    fn from(call: ToolCall) -> Self {
        Self {
            name: call.function.name,
            parameters: call.function.arguments,
        }
    }
}

/// A tool the agent can call
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON Schema of the parameters object
    fn parameters(&self) -> Value;
    async fn invoke(&self, sandbox: &dyn Sandbox, params: Value) -> ToolOutcome;
}

/// Error raised while building a registry
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid parameter schema for tool {tool}: {message}")]
    InvalidSchema { tool: String, message: String },
    #[error("tool {0} is already registered")]
    Duplicate(String),
}

struct RegisteredTool {
    tool: Box<dyn AgentTool>,
    validator: jsonschema::Validator,
}

/// Registered tools with compiled parameter schemas
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry holding `terminal`, `createOrUpdateFiles`, `readFiles` and `listFiles`
    pub fn with_default_tools(terminal_timeout: Duration) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register(Box::new(TerminalTool::new(terminal_timeout)))?;
        registry.register(Box::new(CreateOrUpdateFilesTool))?;
        registry.register(Box::new(ReadFilesTool))?;
        registry.register(Box::new(ListFilesTool))?;
        Ok(registry)
    }

    pub fn register(&mut self, tool: Box<dyn AgentTool>) -> Result<(), RegistryError> {
        if self.tools.iter().any(|t| t.tool.name() == tool.name()) {
            return Err(RegistryError::Duplicate(tool.name().to_string()));
        }
        let validator =
            jsonschema::validator_for(&tool.parameters()).map_err(|e| RegistryError::InvalidSchema {
                tool: tool.name().to_string(),
                message: e.to_string(),
            })?;
        self.tools.push(RegisteredTool { tool, validator });
        Ok(())
    }

    /// Tool contracts sent to the model
    pub fn definitions(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|t| Tool::function(t.tool.name(), t.tool.description(), t.tool.parameters()))
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.tool.name()).collect()
    }

    /// Validate and execute one invocation
    pub async fn dispatch(&self, sandbox: &dyn Sandbox, invocation: &ToolInvocation) -> ToolOutcome {
        let Some(entry) = self.tools.iter().find(|t| t.tool.name() == invocation.name) else {
            warn!(tool = %invocation.name, "Model requested unknown tool");
            TOOL_CALLS.with_label_values(&["unknown", "failure"]).inc();
            return ToolResult::failure(
                format!("unknown tool: {}", invocation.name),
                format!("Available tools: {}", self.names().join(", ")),
            )
            .into();
        };

        let name = entry.tool.name();
        if !entry.validator.is_valid(&invocation.parameters) {
            let problems: Vec<String> = entry
                .validator
                .iter_errors(&invocation.parameters)
                .map(|e| e.to_string())
                .collect();
            warn!(tool = name, problems = ?problems, "Rejected tool parameters");
            TOOL_CALLS.with_label_values(&[name, "failure"]).inc();
            return ToolResult::failure(
                format!("invalid parameters for {name}: {}", problems.join("; ")),
                String::new(),
            )
            .into();
        }

        let outcome = entry.tool.invoke(sandbox, invocation.parameters.clone()).await;
        let status = if outcome.result.success { "success" } else { "failure" };
        TOOL_CALLS.with_label_values(&[name, status]).inc();
        debug!(tool = name, success = outcome.result.success, files = outcome.files.len(), "Tool call finished");
        outcome
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_params<T: DeserializeOwned>(tool: &str, params: Value) -> Result<T, ToolResult> {
    serde_json::from_value(params).map_err(|e| {
        ToolResult::failure(format!("invalid parameters for {tool}: {e}"), String::new())
    })
}

fn truncate_output(text: &str) -> String {
    match text.char_indices().nth(OUTPUT_LIMIT_CHARS) {
        Some((cut, _)) => format!("{}\n...[output truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct PathError {
    path: String,
    error: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// terminal
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TerminalParams {
    command: String,
}

/// Runs a shell command in the sandbox with a bounded timeout
pub struct TerminalTool {
    timeout: Duration,
}

impl TerminalTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl AgentTool for TerminalTool {
    fn name(&self) -> &'static str {
        "terminal"
    }

    fn description(&self) -> &'static str {
        "Use the terminal to run commands in the sandbox environment."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "minLength": 1,
                    "description": "The command to run in the terminal."
                }
            },
            "required": ["command"]
        })
    }

    async fn invoke(&self, sandbox: &dyn Sandbox, params: Value) -> ToolOutcome {
        let params: TerminalParams = match parse_params(self.name(), params) {
            Ok(p) => p,
            Err(result) => return result.into(),
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        let run = {
            let mut sink = |chunk: OutputChunk| match chunk {
                OutputChunk::Stdout(text) => stdout.push_str(&text),
                OutputChunk::Stderr(text) => stderr.push_str(&text),
            };
            tokio::time::timeout(self.timeout, sandbox.run_command(&params.command, &mut sink)).await
        };

        let result = match run {
            Ok(Ok(output)) => {
                let body = format!(
                    "stdout:\n{}\nstderr:\n{}",
                    truncate_output(&output.stdout),
                    truncate_output(&output.stderr)
                );
                match output.exit_code {
                    Some(0) | None => ToolResult::ok(body),
                    Some(code) => ToolResult::failure(format!("command exited with code {code}"), body),
                }
            }
            Ok(Err(e)) => {
                warn!(command = %params.command, error = %e, "Command failed");
                ToolResult::failure(
                    e.to_string(),
                    format!(
                        "Command failed: {e}\nstdout: {}\nstderr: {}",
                        truncate_output(&stdout),
                        truncate_output(&stderr)
                    ),
                )
            }
            Err(_) => {
                warn!(command = %params.command, timeout_secs = self.timeout.as_secs(), "Command timed out");
                ToolResult::failure(
                    format!("command timed out after {}s", self.timeout.as_secs()),
                    format!(
                        "stdout: {}\nstderr: {}",
                        truncate_output(&stdout),
                        truncate_output(&stderr)
                    ),
                )
            }
        };
        result.into()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// createOrUpdateFiles
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct FileEntry {
    path: String,
    content: String,
}

#[derive(Deserialize)]
struct WriteParams {
    files: Vec<FileEntry>,
}

/// Writes a batch of files, one failure never aborting the rest
pub struct CreateOrUpdateFilesTool;

#[async_trait]
impl AgentTool for CreateOrUpdateFilesTool {
    fn name(&self) -> &'static str {
        "createOrUpdateFiles"
    }

    fn description(&self) -> &'static str {
        "Create or update files in the sandbox environment."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "files": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "path": {
                                "type": "string",
                                "minLength": 1,
                                "description": "The path of the file to create or update."
                            },
                            "content": {
                                "type": "string",
                                "description": "The content of the file to create or update."
                            }
                        },
                        "required": ["path", "content"]
                    }
                }
            },
            "required": ["files"]
        })
    }

    async fn invoke(&self, sandbox: &dyn Sandbox, params: Value) -> ToolOutcome {
        let params: WriteParams = match parse_params(self.name(), params) {
            Ok(p) => p,
            Err(result) => return result.into(),
        };
        if params.files.is_empty() {
            return ToolResult::failure("no files provided", String::new()).into();
        }

        let mut written = FileSet::new();
        let mut failed = Vec::new();

        for file in params.files {
            if let Some(parent) = parent_dir(&file.path) {
                if let Err(e) = sandbox.make_dir(parent).await {
                    debug!(path = %file.path, error = %e, "Could not create parent directory");
                }
            }
            match sandbox.write_file(&file.path, &file.content).await {
                Ok(()) => written.insert(file.path, file.content),
                Err(e) => {
                    warn!(path = %file.path, error = %e, "File write failed");
                    failed.push(PathError {
                        path: file.path,
                        error: e.to_string(),
                    });
                }
            }
        }

        let body = json!({
            "written": written.paths().collect::<Vec<_>>(),
            "failed": failed,
        })
        .to_string();

        let result = if written.is_empty() {
            let details: Vec<String> = failed
                .iter()
                .map(|f| format!("{}: {}", f.path, f.error))
                .collect();
            ToolResult::failure(
                format!("failed to write {} file(s): {}", failed.len(), details.join("; ")),
                body,
            )
        } else {
            ToolResult::ok(body)
        };

        ToolOutcome {
            result,
            files: written,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// readFiles
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ReadParams {
    paths: Vec<String>,
}

#[derive(Debug, Serialize)]
struct FileRead {
    path: String,
    content: String,
}

/// Reads each requested path independently
pub struct ReadFilesTool;

#[async_trait]
impl AgentTool for ReadFilesTool {
    fn name(&self) -> &'static str {
        "readFiles"
    }

    fn description(&self) -> &'static str {
        "Read files from the sandbox environment."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "paths": {
                    "type": "array",
                    "items": {
                        "type": "string",
                        "description": "The path of a file to read."
                    }
                }
            },
            "required": ["paths"]
        })
    }

    async fn invoke(&self, sandbox: &dyn Sandbox, params: Value) -> ToolOutcome {
        let params: ReadParams = match parse_params(self.name(), params) {
            Ok(p) => p,
            Err(result) => return result.into(),
        };

        let mut successful_reads = Vec::new();
        let mut failed_reads = Vec::new();

        for path in params.paths {
            match sandbox.read_file(&path).await {
                Ok(content) => successful_reads.push(FileRead { path, content }),
                Err(e) => failed_reads.push(PathError {
                    path,
                    error: e.to_string(),
                }),
            }
        }

        let success = !successful_reads.is_empty();
        let failed_count = failed_reads.len();
        let body = json!({
            "successful_reads": successful_reads,
            "failed_reads": failed_reads,
        })
        .to_string();

        if success {
            ToolResult::ok(body).into()
        } else {
            ToolResult::failure(format!("none of the {failed_count} path(s) could be read"), body).into()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// listFiles
// ─────────────────────────────────────────────────────────────────────────────

fn default_list_path() -> String {
    ".".to_string()
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default = "default_list_path")]
    path: String,
    #[serde(default)]
    recursive: bool,
}

/// Lists a directory for orientation; never mutates the sandbox
pub struct ListFilesTool;

#[async_trait]
impl AgentTool for ListFilesTool {
    fn name(&self) -> &'static str {
        "listFiles"
    }

    fn description(&self) -> &'static str {
        "List files and directories in the sandbox environment."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list. Defaults to the project root."
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Whether to include nested entries."
                }
            }
        })
    }

    async fn invoke(&self, sandbox: &dyn Sandbox, params: Value) -> ToolOutcome {
        let params: ListParams = match parse_params(self.name(), params) {
            Ok(p) => p,
            Err(result) => return result.into(),
        };

        match sandbox.list(&params.path, params.recursive).await {
            Ok(entries) => match serde_json::to_string(&entries) {
                Ok(body) => ToolResult::ok(body).into(),
                Err(e) => ToolResult::failure(e.to_string(), String::new()).into(),
            },
            Err(e) => ToolResult::failure(e.to_string(), format!("Could not list {}", params.path)).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sandbox::{CommandOutput, MemorySandboxProvider, SandboxError, SandboxProvider};

    async fn sandbox_from(provider: &MemorySandboxProvider) -> Arc<dyn Sandbox> {
        let id = provider.create("base").await.unwrap();
        provider.connect(&id).await.unwrap()
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::with_default_tools(DEFAULT_TERMINAL_TIMEOUT).unwrap()
    }

    fn invocation(name: &str, parameters: Value) -> ToolInvocation {
        ToolInvocation {
            name: name.to_string(),
            parameters,
        }
    }

    #[test]
    fn test_default_registry_exposes_four_tools() {
        let registry = registry();
        assert_eq!(
            registry.names(),
            vec!["terminal", "createOrUpdateFiles", "readFiles", "listFiles"]
        );
        let defs = registry.definitions();
        assert!(defs.iter().all(|d| d.tool_type == "function"));
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = registry();
        let err = registry.register(Box::new(ListFilesTool)).unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_read_files_splits_successes_and_failures() {
        let provider = MemorySandboxProvider::new()
            .with_template_files(FileSet::from_iter([("a.txt", "alpha")]));
        let sandbox = sandbox_from(&provider).await;

        let outcome = registry()
            .dispatch(
                sandbox.as_ref(),
                &invocation("readFiles", json!({"paths": ["a.txt", "missing.txt"]})),
            )
            .await;

        assert!(outcome.result.success);
        let body: Value = serde_json::from_str(&outcome.result.result).unwrap();
        assert_eq!(body["successful_reads"][0]["path"], "a.txt");
        assert_eq!(body["successful_reads"][0]["content"], "alpha");
        assert_eq!(body["failed_reads"][0]["path"], "missing.txt");
        assert!(body["failed_reads"][0]["error"].as_str().unwrap().contains("not found"));
        assert!(outcome.files.is_empty());
    }

    #[tokio::test]
    async fn test_read_files_all_missing_fails() {
        let provider = MemorySandboxProvider::new();
        let sandbox = sandbox_from(&provider).await;
        let outcome = registry()
            .dispatch(sandbox.as_ref(), &invocation("readFiles", json!({"paths": ["x"]})))
            .await;
        assert!(!outcome.result.success);
    }

    #[tokio::test]
    async fn test_write_files_returns_delta_and_creates_parents() {
        let provider = MemorySandboxProvider::new();
        let sandbox = sandbox_from(&provider).await;

        let outcome = registry()
            .dispatch(
                sandbox.as_ref(),
                &invocation(
                    "createOrUpdateFiles",
                    json!({"files": [
                        {"path": "app/page.tsx", "content": "v1"},
                        {"path": "app/page.tsx", "content": "v2"},
                        {"path": "README.md", "content": "hi"}
                    ]}),
                ),
            )
            .await;

        assert!(outcome.result.success);
        assert_eq!(outcome.files.len(), 2);
        assert_eq!(outcome.files.get("app/page.tsx"), Some("v2"));
        assert_eq!(sandbox.read_file("app/page.tsx").await.unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_write_delta_uses_canonical_paths() {
        let provider = MemorySandboxProvider::new();
        let sandbox = sandbox_from(&provider).await;

        let outcome = registry()
            .dispatch(
                sandbox.as_ref(),
                &invocation(
                    "createOrUpdateFiles",
                    json!({"files": [
                        {"path": "/home/user/app/page.tsx", "content": "v1"},
                        {"path": "./app/page.tsx", "content": "v2"}
                    ]}),
                ),
            )
            .await;

        assert!(outcome.result.success);
        let paths: Vec<&str> = outcome.files.paths().collect();
        assert_eq!(paths, vec!["app/page.tsx"]);
        assert_eq!(outcome.files.get("app/page.tsx"), Some("v2"));
    }

    #[tokio::test]
    async fn test_write_files_total_failure_is_aggregated() {
        let provider = MemorySandboxProvider::new();
        provider.set_fail_writes(true);
        let sandbox = sandbox_from(&provider).await;

        let outcome = registry()
            .dispatch(
                sandbox.as_ref(),
                &invocation(
                    "createOrUpdateFiles",
                    json!({"files": [
                        {"path": "a.txt", "content": "1"},
                        {"path": "b.txt", "content": "2"}
                    ]}),
                ),
            )
            .await;

        assert!(!outcome.result.success);
        assert!(outcome.files.is_empty());
        let error = outcome.result.error.unwrap();
        assert!(error.starts_with("failed to write 2 file(s)"));
        assert!(error.contains("a.txt") && error.contains("b.txt"));
    }

    #[tokio::test]
    async fn test_invalid_parameters_never_reach_the_sandbox() {
        let provider = MemorySandboxProvider::new();
        let sandbox = sandbox_from(&provider).await;

        let outcome = registry()
            .dispatch(sandbox.as_ref(), &invocation("createOrUpdateFiles", json!({"files": "nope"})))
            .await;

        assert!(!outcome.result.success);
        assert!(outcome.result.error.unwrap().starts_with("invalid parameters for createOrUpdateFiles"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_failed_result() {
        let provider = MemorySandboxProvider::new();
        let sandbox = sandbox_from(&provider).await;
        let outcome = registry()
            .dispatch(sandbox.as_ref(), &invocation("deploy", json!({})))
            .await;
        assert!(!outcome.result.success);
        assert_eq!(outcome.result.error.as_deref(), Some("unknown tool: deploy"));
    }

    #[tokio::test]
    async fn test_terminal_success_and_nonzero_exit() {
        let provider = MemorySandboxProvider::new().with_command_handler(|cmd| {
            let exit_code = if cmd.starts_with("false") { 1 } else { 0 };
            Ok(CommandOutput {
                stdout: format!("out:{cmd}"),
                stderr: String::new(),
                exit_code: Some(exit_code),
            })
        });
        let sandbox = sandbox_from(&provider).await;
        let registry = registry();

        let ok = registry
            .dispatch(sandbox.as_ref(), &invocation("terminal", json!({"command": "npm install zod"})))
            .await;
        assert!(ok.result.success);
        assert!(ok.result.result.contains("out:npm install zod"));

        let failed = registry
            .dispatch(sandbox.as_ref(), &invocation("terminal", json!({"command": "false"})))
            .await;
        assert!(!failed.result.success);
        assert_eq!(failed.result.error.as_deref(), Some("command exited with code 1"));
    }

    #[tokio::test]
    async fn test_terminal_error_is_captured() {
        let provider = MemorySandboxProvider::new()
            .with_command_handler(|_| Err(SandboxError::Other("connection reset".to_string())));
        let sandbox = sandbox_from(&provider).await;

        let outcome = registry()
            .dispatch(sandbox.as_ref(), &invocation("terminal", json!({"command": "ls"})))
            .await;
        assert!(!outcome.result.success);
        assert!(outcome.result.result.starts_with("Command failed: connection reset"));
    }

    struct SlowSandbox;

    #[async_trait]
    impl Sandbox for SlowSandbox {
        fn id(&self) -> &str {
            "slow"
        }
        async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
            Err(SandboxError::NotFound(path.to_string()))
        }
        async fn write_file(&self, _: &str, _: &str) -> Result<(), SandboxError> {
            Ok(())
        }
        async fn make_dir(&self, _: &str) -> Result<(), SandboxError> {
            Ok(())
        }
        async fn list(&self, _: &str, _: bool) -> Result<Vec<crate::sandbox::EntryInfo>, SandboxError> {
            Ok(vec![])
        }
        async fn run_command(
            &self,
            _: &str,
            on_output: &mut (dyn FnMut(OutputChunk) + Send),
        ) -> Result<CommandOutput, SandboxError> {
            on_output(OutputChunk::Stdout("starting".to_string()));
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(CommandOutput::default())
        }
        fn host(&self, port: u16) -> String {
            format!("{port}-slow")
        }
        async fn set_timeout(&self, _: Duration) -> Result<(), SandboxError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_terminal_timeout_is_local_failure() {
        let tool = TerminalTool::new(Duration::from_millis(50));
        let outcome = tool.invoke(&SlowSandbox, json!({"command": "npm run dev"})).await;
        assert!(!outcome.result.success);
        assert!(outcome.result.error.unwrap().contains("timed out"));
        assert!(outcome.result.result.contains("starting"));
    }

    #[tokio::test]
    async fn test_list_files_defaults_to_root() {
        let provider = MemorySandboxProvider::new()
            .with_template_files(FileSet::from_iter([("app/page.tsx", "x")]));
        let sandbox = sandbox_from(&provider).await;
        let outcome = registry()
            .dispatch(sandbox.as_ref(), &invocation("listFiles", json!({})))
            .await;
        assert!(outcome.result.success);
        let entries: Value = serde_json::from_str(&outcome.result.result).unwrap();
        assert_eq!(entries[0]["name"], "app");
        assert_eq!(entries[0]["type"], "dir");
    }

    #[test]
    fn test_truncate_output() {
        let long = "x".repeat(OUTPUT_LIMIT_CHARS + 10);
        assert!(truncate_output(&long).ends_with("[output truncated]"));
        assert_eq!(truncate_output("short"), "short");
    }
}
