//! Sandbox Handle - one connected sandbox owned by a job
//!
//! Each job owns exactly one handle for its lifetime. The handle keeps the
//! provider-assigned id next to the capability and builds the public
//! preview URL.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::{Sandbox, SandboxError, SandboxProvider};

/// Represents a single connected sandbox
pub struct SandboxHandle {
    /// Provider-assigned id (e.g., "sbx-01926abc...")
    pub sandbox_id: String,
    /// Connected capability
    inner: Arc<dyn Sandbox>,
}

impl SandboxHandle {
    /// Wrap an already connected sandbox
    pub fn new(inner: Arc<dyn Sandbox>) -> Self {
        Self {
            sandbox_id: inner.id().to_string(),
            inner,
        }
    }

    /// Create a fresh sandbox from `template_id`, connect to it and extend its lifetime
    pub async fn create(
        provider: &dyn SandboxProvider,
        template_id: &str,
        timeout: Duration,
    ) -> Result<Self, SandboxError> {
        let sandbox_id = provider.create(template_id).await?;
        info!(sandbox_id = %sandbox_id, template_id, "Sandbox created");
        Self::connect(provider, &sandbox_id, timeout).await
    }

    /// Connect to an existing sandbox, extending its lifetime
    pub async fn connect(
        provider: &dyn SandboxProvider,
        sandbox_id: &str,
        timeout: Duration,
    ) -> Result<Self, SandboxError> {
        let inner = provider.connect(sandbox_id).await?;
        inner.set_timeout(timeout).await?;
        debug!(sandbox_id, timeout_ms = timeout.as_millis() as u64, "Sandbox connected");
        Ok(Self::new(inner))
    }

    /// Public preview URL for a port inside the sandbox
    pub fn preview_url(&self, port: u16) -> String {
        format!("https://{}", self.inner.host(port))
    }

    /// Shared reference to the underlying capability
    pub fn sandbox(&self) -> &dyn Sandbox {
        self.inner.as_ref()
    }
}

impl std::fmt::Debug for SandboxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxHandle")
            .field("sandbox_id", &self.sandbox_id)
            .finish()
    }
}
