//! HTTP client for a remote sandbox control API
//!
//! Endpoints (all relative to the configured API URL):
//!
//! ```text
//! POST /sandboxes                      {"templateId"}      -> {"sandboxId"}
//! GET  /sandboxes/{id}                                      -> 200 | 404
//! POST /sandboxes/{id}/timeout         {"timeoutMs"}
//! GET  /sandboxes/{id}/files?path=                          -> file body | 404
//! PUT  /sandboxes/{id}/files?path=     file body
//! POST /sandboxes/{id}/dirs            {"path"}
//! GET  /sandboxes/{id}/list?path=&recursive=                -> [EntryInfo]
//! POST /sandboxes/{id}/commands        {"cmd"}             -> NDJSON stream
//! ```
//!
//! Command output is streamed as newline-delimited JSON objects, each
//! carrying one of `stdout`, `stderr`, `exitCode` or `error`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{
    CommandOutput, EntryInfo, OutputChunk, Sandbox, SandboxError, SandboxProvider,
};

/// One line of the command output stream
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandEvent {
    stdout: Option<String>,
    stderr: Option<String>,
    exit_code: Option<i32>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    sandbox_id: String,
}

/// Fail on any non-success status, keeping the response body for diagnostics
async fn check(response: reqwest::Response) -> Result<reqwest::Response, SandboxError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SandboxError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Apply one NDJSON line to the accumulated output
fn apply_event(
    line: &[u8],
    output: &mut CommandOutput,
    on_output: &mut (dyn FnMut(OutputChunk) + Send),
) -> Result<(), SandboxError> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }
    let event: CommandEvent = serde_json::from_slice(line)?;
    if let Some(error) = event.error {
        return Err(SandboxError::Other(error));
    }
    if let Some(text) = event.stdout {
        output.stdout.push_str(&text);
        on_output(OutputChunk::Stdout(text));
    }
    if let Some(text) = event.stderr {
        output.stderr.push_str(&text);
        on_output(OutputChunk::Stderr(text));
    }
    if event.exit_code.is_some() {
        output.exit_code = event.exit_code;
    }
    Ok(())
}

/// Sandbox reached through the control API
pub struct HttpSandbox {
    id: String,
    base: String,
    host_domain: String,
    client: reqwest::Client,
}

impl HttpSandbox {
    fn url(&self, suffix: &str) -> String {
        format!("{}/sandboxes/{}{}", self.base, self.id, suffix)
    }
}

#[async_trait]
impl Sandbox for HttpSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        let response = self
            .client
            .get(self.url("/files"))
            .query(&[("path", path)])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SandboxError::NotFound(path.to_string()));
        }
        Ok(check(response).await?.text().await?)
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let response = self
            .client
            .put(self.url("/files"))
            .query(&[("path", path)])
            .body(content.to_string())
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn make_dir(&self, path: &str) -> Result<(), SandboxError> {
        let response = self
            .client
            .post(self.url("/dirs"))
            .json(&json!({ "path": path }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn list(&self, path: &str, recursive: bool) -> Result<Vec<EntryInfo>, SandboxError> {
        let response = self
            .client
            .get(self.url("/list"))
            .query(&[("path", path), ("recursive", if recursive { "true" } else { "false" })])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SandboxError::NotFound(path.to_string()));
        }
        let text = check(response).await?.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn run_command(
        &self,
        command: &str,
        on_output: &mut (dyn FnMut(OutputChunk) + Send),
    ) -> Result<CommandOutput, SandboxError> {
        let response = self
            .client
            .post(self.url("/commands"))
            .json(&json!({ "cmd": command }))
            .send()
            .await?;
        let mut stream = check(response).await?.bytes_stream();

        let mut output = CommandOutput::default();
        let mut pending: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            pending.extend_from_slice(&chunk?);
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                apply_event(&line, &mut output, on_output)?;
            }
        }
        if !pending.is_empty() {
            apply_event(&pending, &mut output, on_output)?;
        }

        Ok(output)
    }

    fn host(&self, port: u16) -> String {
        format!("{port}-{}.{}", self.id, self.host_domain)
    }

    async fn set_timeout(&self, timeout: Duration) -> Result<(), SandboxError> {
        let response = self
            .client
            .post(self.url("/timeout"))
            .json(&json!({ "timeoutMs": timeout.as_millis() as u64 }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

/// Provider backed by the sandbox control API
#[derive(Clone)]
pub struct HttpSandboxProvider {
    base: String,
    host_domain: String,
    client: reqwest::Client,
}

impl HttpSandboxProvider {
    /// Create a provider
    ///
    /// # Arguments
    /// * `api_url` - Base URL of the control API (e.g., "https://api.sandbox.dev")
    /// * `api_key` - Optional key sent as `X-API-Key`
    /// * `host_domain` - Domain preview hosts are served under
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<&str>,
        host_domain: impl Into<String>,
    ) -> Result<Self, SandboxError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| SandboxError::Other(format!("invalid API key header: {e}")))?;
            headers.insert("X-API-Key", value);
        }
        let client = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            base: api_url.into().trim_end_matches('/').to_string(),
            host_domain: host_domain.into(),
            client,
        })
    }
}

#[async_trait]
impl SandboxProvider for HttpSandboxProvider {
    async fn create(&self, template_id: &str) -> Result<String, SandboxError> {
        let response = self
            .client
            .post(format!("{}/sandboxes", self.base))
            .json(&json!({ "templateId": template_id }))
            .send()
            .await?;
        let text = check(response).await?.text().await?;
        let created: CreateResponse = serde_json::from_str(&text)?;
        debug!(sandbox_id = %created.sandbox_id, template_id, "Sandbox API created sandbox");
        Ok(created.sandbox_id)
    }

    async fn connect(&self, sandbox_id: &str) -> Result<Arc<dyn Sandbox>, SandboxError> {
        let response = self
            .client
            .get(format!("{}/sandboxes/{}", self.base, sandbox_id))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SandboxError::UnknownSandbox(sandbox_id.to_string()));
        }
        check(response).await?;

        Ok(Arc::new(HttpSandbox {
            id: sandbox_id.to_string(),
            base: self.base.clone(),
            host_domain: self.host_domain.clone(),
            client: self.client.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_event_accumulates_and_streams() {
        let mut output = CommandOutput::default();
        let mut seen = Vec::new();
        let mut sink = |chunk: OutputChunk| seen.push(chunk);

        apply_event(br#"{"stdout":"added 3 packages\n"}"#, &mut output, &mut sink).unwrap();
        apply_event(br#"{"stderr":"npm warn"}"#, &mut output, &mut sink).unwrap();
        apply_event(b"   \n", &mut output, &mut sink).unwrap();
        apply_event(br#"{"exitCode":0}"#, &mut output, &mut sink).unwrap();

        assert_eq!(output.stdout, "added 3 packages\n");
        assert_eq!(output.stderr, "npm warn");
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_apply_event_error_line_fails() {
        let mut output = CommandOutput::default();
        let err = apply_event(br#"{"error":"sandbox gone"}"#, &mut output, &mut |_| {}).unwrap_err();
        assert_eq!(err.to_string(), "sandbox gone");
    }

    #[test]
    fn test_provider_trims_trailing_slash() {
        let provider = HttpSandboxProvider::new("http://localhost:9000/", Some("key"), "sbx.dev").unwrap();
        assert_eq!(provider.base, "http://localhost:9000");
    }
}
