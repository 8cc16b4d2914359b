//! Engine configuration loaded from TOML, with environment overrides.
//!
//! Every field has a default, so an empty or missing file yields a working
//! local setup: Ollama on `localhost:11434`, the in-memory sandbox provider
//! and an in-memory store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::AgentConfig;
use crate::jobs::{GenerationSettings, RecreationSettings};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub agent: AgentSection,
    pub sandbox: SandboxSection,
    pub model: ModelSection,
    pub lifecycle: LifecycleSection,
    pub store: StoreSection,
    pub server: ServerSection,
    pub telemetry: TelemetrySection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Model driving the agent loop
    pub model: String,
    /// Model calls per run before giving up
    pub max_iterations: usize,
    pub terminal_timeout_secs: u64,
    /// Prior messages fed into each run
    pub history_limit: usize,
    /// Replaces the built-in system instruction
    pub system_prompt: Option<String>,
    /// Model for title generation (defaults to `model`)
    pub title_model: Option<String>,
    /// Model for response generation (defaults to `model`)
    pub response_model: Option<String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            model: "qwen3".to_string(),
            max_iterations: 15,
            terminal_timeout_secs: 30,
            history_limit: 3,
            system_prompt: None,
            title_model: None,
            response_model: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxProviderKind {
    Http,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    pub provider: SandboxProviderKind,
    /// Base URL of the sandbox control API (`provider = "http"`)
    pub api_url: String,
    pub api_key: Option<String>,
    pub template_id: String,
    /// Sandbox lifetime set after create and connect
    pub timeout_ms: u64,
    pub preview_port: u16,
    /// Domain of generated preview hosts
    pub host_domain: String,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            provider: SandboxProviderKind::Memory,
            api_url: "http://localhost:49982".to_string(),
            api_key: None,
            template_id: "nextjs-base".to_string(),
            timeout_ms: 600_000,
            preview_port: 3000,
            host_domain: "sandbox.local".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// Ollama base URL
    pub base_url: String,
    pub temperature: f32,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            temperature: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSection {
    pub probe_timeout_secs: u64,
    /// Age after which a recreation flag is considered abandoned
    pub recreation_lease_secs: u64,
    /// Suggested client polling interval, returned by the status API
    pub poll_interval_ms: u64,
}

impl Default for LifecycleSection {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 10,
            recreation_lease_secs: 300,
            poll_interval_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// JSON snapshot file; in-memory only when unset
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySection {
    pub otlp_endpoint: Option<String>,
    pub json_logs: bool,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if !(1..=50).contains(&self.agent.max_iterations) {
            return invalid("agent.max_iterations must be between 1 and 50");
        }
        if !(1..=10).contains(&self.agent.history_limit) {
            return invalid("agent.history_limit must be between 1 and 10");
        }
        if self.agent.terminal_timeout_secs == 0 {
            return invalid("agent.terminal_timeout_secs must be > 0");
        }
        if self.agent.model.trim().is_empty() {
            return invalid("agent.model must not be empty");
        }
        if self.sandbox.template_id.trim().is_empty() {
            return invalid("sandbox.template_id must not be empty");
        }
        if self.sandbox.provider == SandboxProviderKind::Http && self.sandbox.api_url.trim().is_empty() {
            return invalid("sandbox.api_url is required for the http provider");
        }
        if self.lifecycle.probe_timeout_secs == 0 {
            return invalid("lifecycle.probe_timeout_secs must be > 0");
        }
        if self.lifecycle.recreation_lease_secs == 0 {
            return invalid("lifecycle.recreation_lease_secs must be > 0");
        }
        Ok(())
    }

    /// Apply `SANDFORGE_*` and `OTEL_EXPORTER_OTLP_ENDPOINT` overrides
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("SANDFORGE_MODEL") {
            self.agent.model = model;
        }
        if let Some(url) = lookup("SANDFORGE_OLLAMA_URL") {
            self.model.base_url = url;
        }
        if let Some(url) = lookup("SANDFORGE_SANDBOX_API_URL") {
            self.sandbox.api_url = url;
            self.sandbox.provider = SandboxProviderKind::Http;
        }
        if let Some(key) = lookup("SANDFORGE_SANDBOX_API_KEY") {
            self.sandbox.api_key = Some(key);
        }
        if let Some(bind) = lookup("SANDFORGE_BIND") {
            self.server.bind = bind;
        }
        if let Some(endpoint) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") {
            self.telemetry.otlp_endpoint = Some(endpoint);
        }
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            model: self.agent.model.clone(),
            max_iterations: self.agent.max_iterations,
            system_prompt: self.agent.system_prompt.clone(),
        }
    }

    pub fn terminal_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.terminal_timeout_secs)
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            template_id: self.sandbox.template_id.clone(),
            sandbox_timeout: Duration::from_millis(self.sandbox.timeout_ms),
            preview_port: self.sandbox.preview_port,
            history_limit: self.agent.history_limit,
            title_model: self
                .agent
                .title_model
                .clone()
                .unwrap_or_else(|| self.agent.model.clone()),
            response_model: self
                .agent
                .response_model
                .clone()
                .unwrap_or_else(|| self.agent.model.clone()),
        }
    }

    pub fn recreation_settings(&self) -> RecreationSettings {
        RecreationSettings {
            template_id: self.sandbox.template_id.clone(),
            sandbox_timeout: Duration::from_millis(self.sandbox.timeout_ms),
            preview_port: self.sandbox.preview_port,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.lifecycle.probe_timeout_secs)
    }

    pub fn recreation_lease(&self) -> Duration {
        Duration::from_secs(self.lifecycle.recreation_lease_secs)
    }
}

/// Parse a TOML document without touching the environment
pub fn parse_config(contents: &str, path: &Path) -> Result<EngineConfig, ConfigError> {
    toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load config from a TOML file.
///
/// A missing file yields `EngineConfig::default()`. Environment overrides are
/// applied before validation.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let mut cfg = if path.exists() {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        parse_config(&contents, path)?
    } else {
        EngineConfig::default()
    };
    cfg.apply_env_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = EngineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.agent.max_iterations, 15);
        assert_eq!(cfg.sandbox.timeout_ms, 600_000);
        assert_eq!(cfg.generation_settings().title_model, "qwen3");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let cfg = parse_config(
            r#"
            [agent]
            model = "llama3.2"
            max_iterations = 10
            title_model = "qwen3:0.6b"

            [sandbox]
            provider = "http"
            api_url = "https://sandboxes.internal"
            "#,
            Path::new("sandforge.toml"),
        )
        .unwrap();

        assert_eq!(cfg.agent.model, "llama3.2");
        assert_eq!(cfg.agent.history_limit, 3);
        assert_eq!(cfg.sandbox.provider, SandboxProviderKind::Http);
        assert_eq!(cfg.server.bind, "127.0.0.1:8080");

        let settings = cfg.generation_settings();
        assert_eq!(settings.title_model, "qwen3:0.6b");
        assert_eq!(settings.response_model, "llama3.2");
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.agent.max_iterations = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = EngineConfig::default();
        cfg.agent.history_limit = 11;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SANDFORGE_MODEL", "codellama"),
            ("SANDFORGE_SANDBOX_API_URL", "https://sbx.example"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
        ]);
        let mut cfg = EngineConfig::default();
        cfg.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(cfg.agent.model, "codellama");
        assert_eq!(cfg.sandbox.provider, SandboxProviderKind::Http);
        assert_eq!(cfg.sandbox.api_url, "https://sbx.example");
        assert_eq!(cfg.telemetry.otlp_endpoint.as_deref(), Some("http://localhost:4317"));
        assert_eq!(cfg.server.bind, "127.0.0.1:8080");
    }

    #[test]
    fn test_missing_file_returns_default() {
        let temp = tempfile::tempdir().unwrap();
        let cfg = load_config(&temp.path().join("missing.toml")).unwrap();
        assert_eq!(cfg.agent.max_iterations, EngineConfig::default().agent.max_iterations);
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bad.toml");
        std::fs::write(&path, "[agent\nmodel = ").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }
}
