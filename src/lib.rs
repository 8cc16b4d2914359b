//! Sandforge - background orchestration engine for sandboxed code generation
//!
//! This library takes a natural-language build request, drives a coding agent
//! through a bounded number of model/tool iterations against a remote sandbox,
//! and persists the resulting file set together with a short summary.
//!
//! # Modules
//!
//! - `agent` - the bounded agent loop, tool registry and run state
//! - `model` - model inference capability (Ollama `/api/chat` client)
//! - `sandbox` - remote sandbox capability, providers and health probe
//! - `lifecycle` - sandbox liveness tracking and serialized recreation
//! - `jobs` - generation and recreation jobs plus the job worker
//! - `store` - persistence of projects, messages and artifacts
//! - `events` - fire-and-forget event dispatch between jobs
//! - `server` - HTTP status queries, job submission and metrics
//! - `config` - TOML configuration with environment overrides
//! - `metrics` - Prometheus metrics for observability
//!
//! # Quick Start
//!
//! ```ignore
//! use sandforge::agent::{AgentConfig, AgentController, FileSet, ToolRegistry, DEFAULT_TERMINAL_TIMEOUT};
//!
//! let tools = ToolRegistry::with_default_tools(DEFAULT_TERMINAL_TIMEOUT)?;
//! let controller = AgentController::new(model, tools, AgentConfig::default());
//! let outcome = controller.run(sandbox.as_ref(), "Build a todo app", FileSet::new(), vec![]).await;
//! ```

pub mod agent;
pub mod config;
pub mod events;
pub mod jobs;
pub mod lifecycle;
pub mod metrics;
pub mod model;
pub mod sandbox;
pub mod server;
pub mod store;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentController, AgentOutcome, FileSet};
pub use lifecycle::{SandboxLifecycleManager, SandboxStatus};
pub use sandbox::{Sandbox, SandboxHandle, SandboxProvider};
