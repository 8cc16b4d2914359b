//! Agent module for LLM-driven code generation
//!
//! This module provides the bounded agent loop that orchestrates:
//! - a pluggable model with tool calling
//! - the tool registry (terminal, file writes, file reads, listing)
//! - one sandbox owned by the calling job
//!
//! # Architecture
//!
//! ```text
//! Request + Seed (prior files, prior messages)
//!                  ↓
//!           AgentController.run()
//!                  ↓
//!           ModelClient.chat(history, tool definitions)
//!                  ↓
//!       text ──► <task_summary>? ──► stop
//!                  ↓
//!           ToolRegistry.dispatch() (sequential) → ToolResult + FileSet delta
//!                  ↓
//!           AgentRunState.apply(delta), feed results back → next iteration
//!                  ↓
//!           cap reached → degraded success or fixed failure summary
//! ```

pub mod controller;
pub mod prompts;
pub mod seeding;
pub mod state;
pub mod tools;

pub use controller::{AgentConfig, AgentController, AgentOutcome, Termination};
pub use seeding::{load_seed, Seed};
pub use state::{AgentRunState, ConversationMessage, FileSet, Role};
pub use tools::{
    AgentTool, RegistryError, ToolInvocation, ToolOutcome, ToolRegistry, ToolResult,
    DEFAULT_TERMINAL_TIMEOUT,
};
