//! Generation job: one build request from sandbox creation to persisted message
//!
//! ```text
//! create sandbox (template) → set_timeout
//!        ↓
//! load seed (recent messages, prior artifact files)
//!        ↓
//! baseline snapshot → restore prior files
//!        ↓
//! AgentController.run()
//!        ↓
//! failed? ── yes ──► ERROR message
//!        │
//!        no ──► title + response generation ──► RESULT message + artifact
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};

use super::{write_with_parents, JobError};
use crate::agent::prompts::{
    ERROR_MESSAGE, FALLBACK_RESPONSE, FALLBACK_TITLE, MISSING_SUMMARY, RESPONSE_PROMPT, TITLE_PROMPT,
};
use crate::agent::{load_seed, AgentController, FileSet};
use crate::events::GenerationRequest;
use crate::model::ModelClient;
use crate::sandbox::{collect_files, Sandbox, SandboxHandle, SandboxProvider};
use crate::store::{Message, NewArtifact, NewMessage, ProjectStore};

/// Knobs for a generation job
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    /// Sandbox template every run starts from
    pub template_id: String,
    /// Lifetime set on the sandbox after creation
    pub sandbox_timeout: Duration,
    /// Port whose host becomes the preview URL
    pub preview_port: u16,
    /// Number of prior messages fed to the agent
    pub history_limit: usize,
    pub title_model: String,
    pub response_model: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            template_id: "nextjs-base".to_string(),
            sandbox_timeout: Duration::from_millis(600_000),
            preview_port: 3000,
            history_limit: 3,
            title_model: "qwen3".to_string(),
            response_model: "qwen3".to_string(),
        }
    }
}

/// What a finished generation job reports
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutput {
    pub url: String,
    pub title: String,
    pub files: FileSet,
    pub summary: String,
    /// False when an ERROR message was persisted
    pub success: bool,
    /// The persisted RESULT or ERROR message
    pub message: Message,
}

pub struct GenerationJob {
    store: Arc<dyn ProjectStore>,
    sandboxes: Arc<dyn SandboxProvider>,
    model: Arc<dyn ModelClient>,
    agent: AgentController,
    settings: GenerationSettings,
}

impl GenerationJob {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        sandboxes: Arc<dyn SandboxProvider>,
        model: Arc<dyn ModelClient>,
        agent: AgentController,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            store,
            sandboxes,
            model,
            agent,
            settings,
        }
    }

    /// Run one `code-agent/run` event to completion.
    ///
    /// Store failures propagate so the queue can retry; everything the agent
    /// does wrong ends as a persisted ERROR message instead.
    pub async fn run(&self, request: &GenerationRequest) -> Result<GenerationOutput, JobError> {
        let span = info_span!(
            "generation_job",
            project_id = %request.project_id,
            otel.name = "generation_job"
        );
        self.execute(request).instrument(span).await
    }

    async fn execute(&self, request: &GenerationRequest) -> Result<GenerationOutput, JobError> {
        let handle = match SandboxHandle::create(
            self.sandboxes.as_ref(),
            &self.settings.template_id,
            self.settings.sandbox_timeout,
        )
        .await
        {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, template_id = %self.settings.template_id, "Could not create sandbox");
                self.store
                    .create_message(NewMessage::error(&request.project_id, ERROR_MESSAGE))
                    .await?;
                return Err(e.into());
            }
        };

        let seed = load_seed(
            self.store.as_ref(),
            &request.project_id,
            &request.content,
            self.settings.history_limit,
            request.prior_artifact_id.as_deref(),
        )
        .await?;

        let baseline = match collect_files(handle.sandbox()).await {
            Ok(files) => files,
            Err(e) => {
                warn!(sandbox_id = %handle.sandbox_id, error = %e, "Baseline snapshot failed");
                FileSet::new()
            }
        };
        restore_files(handle.sandbox(), &seed.files).await;

        let outcome = self
            .agent
            .run(handle.sandbox(), &request.content, seed.files, seed.messages)
            .await;

        let url = handle.preview_url(self.settings.preview_port);
        let summary = if outcome.summary.is_empty() {
            MISSING_SUMMARY.to_string()
        } else {
            outcome.summary.clone()
        };

        if !outcome.success || outcome.files.is_empty() {
            warn!(run_id = %outcome.run_id, iterations = outcome.iterations, "Run failed, persisting error");
            let (message, _) = self
                .store
                .create_message(NewMessage::error(&request.project_id, ERROR_MESSAGE))
                .await?;
            return Ok(GenerationOutput {
                url,
                title: FALLBACK_TITLE.to_string(),
                files: outcome.files,
                summary,
                success: false,
                message,
            });
        }

        let (title, response) = tokio::join!(
            self.generate_title(&outcome.summary),
            self.generate_response(&outcome.summary)
        );
        let files = baseline.merged(outcome.files);

        let (message, _) = self
            .store
            .create_message(NewMessage::result(
                &request.project_id,
                response,
                NewArtifact {
                    sandbox_url: url.clone(),
                    title: title.clone(),
                    files: files.clone(),
                },
            ))
            .await?;

        info!(
            run_id = %outcome.run_id,
            message_id = %message.id,
            files = files.len(),
            url = %url,
            "Generation persisted"
        );

        Ok(GenerationOutput {
            url,
            title,
            files,
            summary,
            success: true,
            message,
        })
    }

    async fn generate_title(&self, summary: &str) -> String {
        match self
            .model
            .complete(&self.settings.title_model, TITLE_PROMPT, summary)
            .await
        {
            Ok(text) => clean_title(&text),
            Err(e) => {
                warn!(error = %e, "Title generation failed");
                FALLBACK_TITLE.to_string()
            }
        }
    }

    async fn generate_response(&self, summary: &str) -> String {
        match self
            .model
            .complete(&self.settings.response_model, RESPONSE_PROMPT, summary)
            .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => FALLBACK_RESPONSE.to_string(),
            Err(e) => {
                warn!(error = %e, "Response generation failed");
                FALLBACK_RESPONSE.to_string()
            }
        }
    }
}

/// Write the prior artifact into a fresh sandbox; failures are only logged
async fn restore_files(sandbox: &dyn Sandbox, files: &FileSet) {
    let mut failed = 0;
    for (path, content) in files.iter() {
        if let Err(e) = write_with_parents(sandbox, path, content).await {
            warn!(path, error = %e, "Could not restore prior file");
            failed += 1;
        }
    }
    if !files.is_empty() {
        info!(restored = files.len() - failed, failed, "Prior files restored");
    }
}

/// First non-empty line, stripped of quotes and markdown decoration
fn clean_title(raw: &str) -> String {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    let title = line
        .trim_start_matches('#')
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '*' | '`'))
        .trim();
    if title.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        title.to_string()
    }
}
