//! Agent Controller - bounded orchestration loop for LLM-driven code generation
//!
//! The AgentController drives a model through at most `max_iterations` calls,
//! executing the tool calls it requests against one sandbox and feeding the
//! results back until the model reports a `<task_summary>` or the cap is hit.
//!
//! Termination priority:
//! 1. terminal marker seen → success
//! 2. cap reached or model error, with files → degraded success
//! 3. no marker and no files → failure with a fixed summary

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::prompts::{CONTINUE_NUDGE, DEFAULT_SYSTEM_PROMPT, FAILURE_SUMMARY, TERMINAL_MARKER};
use super::state::{AgentRunState, ConversationMessage, FileSet, Role};
use super::tools::{ToolInvocation, ToolRegistry};
use crate::metrics::{AGENT_ITERATIONS, AGENT_RUNS, LLM_CALL_TIME};
use crate::model::{ChatMessage, ModelClient};
use crate::sandbox::Sandbox;

/// Configuration for the agent controller
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier passed to the model capability (e.g., "qwen3")
    pub model: String,
    /// Maximum number of model calls before stopping
    pub max_iterations: usize,
    /// Custom system prompt (uses default if None)
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "qwen3".to_string(),
            max_iterations: 15,
            system_prompt: None,
        }
    }
}

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The model emitted the terminal marker
    Marker,
    /// The iteration cap was reached without a marker
    CapReached,
    /// A model call failed; the loop stopped early
    Aborted(String),
}

/// Result of an agent run
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// Terminal summary, synthesized when the model never produced one
    pub summary: String,
    /// Final working file set (prior files plus everything written)
    pub files: FileSet,
    /// Chronological transcript, system instruction first
    pub messages: Vec<ConversationMessage>,
    /// False only when the run ended with no marker and no files
    pub success: bool,
    /// Number of model calls made
    pub iterations: usize,
    /// Number of tool calls dispatched
    pub tool_calls_made: usize,
    /// Time-sortable id correlating logs and spans of this run
    pub run_id: String,
    pub termination: Termination,
}

/// Agent Controller orchestrating the model and sandbox tools
pub struct AgentController {
    model: Arc<dyn ModelClient>,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl AgentController {
    /// Create a new agent controller
    ///
    /// # Arguments
    /// * `model` - model inference capability
    /// * `tools` - registry of tools offered to the model
    /// * `config` - agent configuration
    pub fn new(model: Arc<dyn ModelClient>, tools: ToolRegistry, config: AgentConfig) -> Self {
        Self {
            model,
            tools,
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run the agent loop for one request
    ///
    /// # Arguments
    /// * `sandbox` - environment the tools operate on, owned by the caller
    /// * `request` - the user's natural-language build request
    /// * `prior_files` - files of the previous artifact, seeded into the run
    /// * `prior_messages` - earlier conversation, chronological
    ///
    /// Never fails: model errors are folded into the outcome.
    pub async fn run(
        &self,
        sandbox: &dyn Sandbox,
        request: &str,
        prior_files: FileSet,
        prior_messages: Vec<ConversationMessage>,
    ) -> AgentOutcome {
        let run_id = Uuid::now_v7().to_string();

        let root_span = info_span!(
            "agent_run",
            run_id = %run_id,
            model = %self.config.model,
            sandbox_id = %sandbox.id(),
            otel.name = "agent_run"
        );

        self.run_inner(sandbox, request, prior_files, prior_messages, run_id)
            .instrument(root_span)
            .await
    }

    async fn run_inner(
        &self,
        sandbox: &dyn Sandbox,
        request: &str,
        prior_files: FileSet,
        prior_messages: Vec<ConversationMessage>,
        run_id: String,
    ) -> AgentOutcome {
        info!(
            run_id = %run_id,
            prior_files = prior_files.len(),
            prior_messages = prior_messages.len(),
            "Starting agent run"
        );

        let mut state = AgentRunState::seeded(prior_files);
        let system_prompt = self
            .config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        state.push_message(ConversationMessage::system(system_prompt));
        for message in prior_messages {
            state.push_message(message);
        }
        state.push_message(ConversationMessage::user(request));

        // Wire history: the transcript plus tool calls and tool results
        let mut history: Vec<ChatMessage> = state.messages.iter().map(to_chat_message).collect();
        let tools = self.tools.definitions();
        let mut tool_calls_made = 0;
        let mut abort_reason = None;

        while state.iteration_count < self.config.max_iterations {
            state.iteration_count += 1;
            let iteration = state.iteration_count;

            let llm_span = info_span!(
                "llm_call",
                run_id = %run_id,
                iteration,
                model = %self.config.model,
                otel.name = "llm_call"
            );
            let call_start = Instant::now();
            let reply = self
                .model
                .chat(&self.config.model, &history, &tools)
                .instrument(llm_span)
                .await;
            LLM_CALL_TIME
                .with_label_values(&[&self.config.model])
                .observe(call_start.elapsed().as_secs_f64());

            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(run_id = %run_id, iteration, error = %e, "Model call failed, stopping run");
                    abort_reason = Some(e.to_string());
                    break;
                }
            };

            debug!(
                run_id = %run_id,
                iteration,
                text_len = reply.text.len(),
                tool_calls = reply.tool_calls.len(),
                "Model replied"
            );

            let has_text = !reply.text.trim().is_empty();
            let finished = has_text && reply.text.contains(TERMINAL_MARKER);

            if has_text || !reply.tool_calls.is_empty() {
                history.push(
                    ChatMessage::assistant(reply.text.clone()).with_tool_calls(reply.tool_calls.clone()),
                );
            }
            if has_text {
                state.push_message(ConversationMessage::assistant(reply.text.clone()));
            }
            if finished && state.record_summary(reply.text.clone()) {
                info!(run_id = %run_id, iteration, "Terminal summary received");
            }

            let requested_tools = !reply.tool_calls.is_empty();
            for call in reply.tool_calls {
                let invocation = ToolInvocation::from(call);
                let tool_span = info_span!(
                    "tool_call",
                    run_id = %run_id,
                    iteration,
                    tool = %invocation.name,
                    otel.name = "tool_call"
                );
                let outcome = self
                    .tools
                    .dispatch(sandbox, &invocation)
                    .instrument(tool_span)
                    .await;
                tool_calls_made += 1;

                if !outcome.result.success {
                    debug!(
                        run_id = %run_id,
                        tool = %invocation.name,
                        error = outcome.result.error.as_deref().unwrap_or(""),
                        "Tool call reported failure"
                    );
                }
                history.push(ChatMessage::tool(outcome.result.to_message()));
                state.apply(outcome.files);
            }

            if finished {
                break;
            }

            if !requested_tools {
                debug!(run_id = %run_id, iteration, "No tool calls and no summary, nudging model");
                history.push(ChatMessage::user(CONTINUE_NUDGE));
                state.push_message(ConversationMessage::user(CONTINUE_NUDGE));
            }
        }

        let iterations = state.iteration_count;
        let (termination, success, outcome_label) = if !state.summary.is_empty() {
            (Termination::Marker, true, "completed")
        } else {
            let termination = match abort_reason {
                Some(reason) => Termination::Aborted(reason),
                None => Termination::CapReached,
            };
            if state.files.is_empty() {
                state.summary = FAILURE_SUMMARY.to_string();
                (termination, false, "failed")
            } else {
                state.summary = degraded_summary(&termination, iterations, state.files.len());
                (termination, true, "degraded")
            }
        };

        AGENT_RUNS.with_label_values(&[outcome_label]).inc();
        AGENT_ITERATIONS.observe(iterations as f64);

        info!(
            run_id = %run_id,
            iterations,
            tool_calls = tool_calls_made,
            files = state.files.len(),
            outcome = outcome_label,
            "Agent run finished"
        );

        AgentOutcome {
            summary: state.summary,
            files: state.files,
            messages: state.messages,
            success,
            iterations,
            tool_calls_made,
            run_id,
            termination,
        }
    }
}

fn to_chat_message(message: &ConversationMessage) -> ChatMessage {
    match message.role {
        Role::System => ChatMessage::system(message.content.clone()),
        Role::User => ChatMessage::user(message.content.clone()),
        Role::Assistant => ChatMessage::assistant(message.content.clone()),
    }
}

/// Summary for a run that produced files but never reported completion
fn degraded_summary(termination: &Termination, iterations: usize, file_count: usize) -> String {
    let reason = match termination {
        Termination::Aborted(error) => format!("the agent stopped early after an error: {error}"),
        _ => format!("the agent reached its limit of {iterations} iterations"),
    };
    format!(
        "<task_summary>\nPartially completed: {reason}. {file_count} file(s) were produced and saved; \
         review them before building on this result.\n</task_summary>"
    )
}
