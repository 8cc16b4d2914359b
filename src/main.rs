//! sandforge - background orchestration engine for sandboxed code generation
//!
//! ```text
//! sandforge serve --config sandforge.toml        # HTTP API + job worker
//! sandforge run --config sandforge.toml "Build a todo app"
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use sandforge::agent::{AgentController, ToolRegistry};
use sandforge::config::{load_config, EngineConfig, SandboxProviderKind};
use sandforge::events::{ChannelDispatcher, GenerationRequest};
use sandforge::jobs::{GenerationJob, JobWorker, RecreationJob};
use sandforge::lifecycle::SandboxLifecycleManager;
use sandforge::model::{ChatClient, ModelClient};
use sandforge::sandbox::{HttpProbe, HttpSandboxProvider, MemorySandboxProvider, SandboxProvider};
use sandforge::server::{create_router, project_slug, AppState};
use sandforge::store::{JsonStore, NewMessage, ProjectStore};
use sandforge::tracing::{init_tracing, shutdown_tracing};

/// Capacity of the in-process event queue
const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Parser)]
#[command(name = "sandforge")]
#[command(about = "Drives a coding agent against remote sandboxes and persists the results", version)]
struct Cli {
    /// Path to the TOML config file (defaults apply when missing)
    #[arg(long, short, global = true, default_value = "sandforge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API and run queued jobs
    Serve,
    /// Run one generation job and print the persisted result as JSON
    Run {
        /// Existing project to extend (a new one is created otherwise)
        #[arg(long)]
        project: Option<String>,
        /// Natural-language build request
        request: String,
    },
}

struct Engine {
    store: Arc<dyn ProjectStore>,
    generation: Arc<GenerationJob>,
    recreation: Arc<RecreationJob>,
}

fn sandbox_provider(cfg: &EngineConfig) -> Result<Arc<dyn SandboxProvider>> {
    let provider: Arc<dyn SandboxProvider> = match cfg.sandbox.provider {
        SandboxProviderKind::Http => Arc::new(
            HttpSandboxProvider::new(
                cfg.sandbox.api_url.clone(),
                cfg.sandbox.api_key.as_deref(),
                cfg.sandbox.host_domain.clone(),
            )
            .context("build sandbox API client")?,
        ),
        SandboxProviderKind::Memory => {
            Arc::new(MemorySandboxProvider::new().with_host_domain(cfg.sandbox.host_domain.clone()))
        }
    };
    Ok(provider)
}

async fn build_engine(cfg: &EngineConfig) -> Result<Engine> {
    let store: Arc<dyn ProjectStore> = match &cfg.store.path {
        Some(path) => Arc::new(
            JsonStore::open(path)
                .await
                .with_context(|| format!("open store {}", path.display()))?,
        ),
        None => Arc::new(JsonStore::in_memory()),
    };
    let sandboxes = sandbox_provider(cfg)?;
    let model: Arc<dyn ModelClient> = Arc::new(
        ChatClient::new(cfg.model.base_url.clone()).with_temperature(cfg.model.temperature),
    );

    let tools = ToolRegistry::with_default_tools(cfg.terminal_timeout()).context("register tools")?;
    let agent = AgentController::new(model.clone(), tools, cfg.agent_config());

    let generation = Arc::new(GenerationJob::new(
        store.clone(),
        sandboxes.clone(),
        model,
        agent,
        cfg.generation_settings(),
    ));
    let recreation = Arc::new(RecreationJob::new(
        store.clone(),
        sandboxes,
        cfg.recreation_settings(),
    ));

    Ok(Engine {
        store,
        generation,
        recreation,
    })
}

async fn serve(cfg: EngineConfig) -> Result<()> {
    let engine = build_engine(&cfg).await?;
    let (dispatcher, rx) = ChannelDispatcher::new(EVENT_QUEUE_CAPACITY);
    let dispatcher = Arc::new(dispatcher);

    let probe = HttpProbe::new(cfg.probe_timeout()).context("build health probe")?;
    let lifecycle = Arc::new(SandboxLifecycleManager::new(
        engine.store.clone(),
        Arc::new(probe),
        dispatcher.clone(),
        cfg.recreation_lease(),
    ));

    let worker = JobWorker::new(engine.generation.clone(), engine.recreation.clone());
    let worker_handle = tokio::spawn(worker.run(rx));

    let app = create_router(AppState {
        store: engine.store.clone(),
        lifecycle,
        dispatcher,
        poll_interval_ms: cfg.lifecycle.poll_interval_ms,
    });

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("bind {}", cfg.server.bind))?;
    info!(addr = %cfg.server.bind, provider = ?cfg.sandbox.provider, model = %cfg.agent.model, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    worker_handle.abort();
    Ok(())
}

async fn run_once(cfg: EngineConfig, project: Option<String>, request: String) -> Result<()> {
    let engine = build_engine(&cfg).await?;

    let project_id = match project {
        Some(id) => engine
            .store
            .find_project(&id)
            .await?
            .with_context(|| format!("project {id} not found"))?
            .id,
        None => engine.store.create_project(&project_slug(&request)).await?.id,
    };
    engine
        .store
        .create_message(NewMessage::user(&project_id, request.clone()))
        .await?;

    let output = engine
        .generation
        .run(&GenerationRequest {
            content: request,
            project_id,
            prior_artifact_id: None,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    init_tracing(
        "sandforge",
        cfg.telemetry.otlp_endpoint.as_deref(),
        cfg.telemetry.json_logs,
    )?;

    let result = match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Run { project, request } => run_once(cfg, project, request).await,
    };

    shutdown_tracing();
    result
}
