//! Prometheus metrics for the orchestration engine
//!
//! All metrics live in the default registry and are exposed by the HTTP
//! server at `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_histogram_vec,
    CounterVec, Encoder, Gauge, Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Agent Loop Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Finished agent runs by outcome.
    ///
    /// Labels:
    /// - outcome: "completed", "degraded" or "failed"
    pub static ref AGENT_RUNS: CounterVec = register_counter_vec!(
        "sandforge_agent_runs_total",
        "Finished agent runs by outcome",
        &["outcome"]
    ).expect("failed to register AGENT_RUNS metric");

    /// Model calls needed per agent run.
    pub static ref AGENT_ITERATIONS: Histogram = register_histogram!(
        "sandforge_agent_iterations",
        "Model calls per agent run",
        vec![1.0, 2.0, 3.0, 5.0, 8.0, 10.0, 15.0, 20.0]
    ).expect("failed to register AGENT_ITERATIONS metric");

    /// Tool invocations by tool name and result.
    ///
    /// Labels:
    /// - tool: registered tool name (e.g., "terminal")
    /// - status: "success" or "failure"
    pub static ref TOOL_CALLS: CounterVec = register_counter_vec!(
        "sandforge_tool_calls_total",
        "Tool invocations by tool and status",
        &["tool", "status"]
    ).expect("failed to register TOOL_CALLS metric");

    /// Latency of model calls in seconds.
    pub static ref LLM_CALL_TIME: HistogramVec = register_histogram_vec!(
        "sandforge_llm_call_seconds",
        "Model call latency in seconds",
        &["model"]
    ).expect("failed to register LLM_CALL_TIME metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Sandbox Lifecycle Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Preview URL probes by result ("alive" or "unreachable").
    pub static ref SANDBOX_PROBES: CounterVec = register_counter_vec!(
        "sandforge_sandbox_probes_total",
        "Sandbox liveness probes by result",
        &["result"]
    ).expect("failed to register SANDBOX_PROBES metric");

    /// Recreation jobs by outcome ("dispatched", "succeeded", "failed").
    pub static ref RECREATIONS: CounterVec = register_counter_vec!(
        "sandforge_recreations_total",
        "Sandbox recreation jobs by outcome",
        &["outcome"]
    ).expect("failed to register RECREATIONS metric");

    /// Recreation jobs currently running in this process.
    pub static ref RECREATIONS_IN_FLIGHT: Gauge = register_gauge!(
        "sandforge_recreations_in_flight",
        "Sandbox recreation jobs currently running"
    ).expect("failed to register RECREATIONS_IN_FLIGHT metric");
}

/// Render every registered metric in the Prometheus text format.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
