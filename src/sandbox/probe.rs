//! Liveness probe for sandbox preview URLs
//!
//! A sandbox counts as alive only when a GET on its preview URL ends in a
//! 2xx status (redirects followed). Any other status, a timeout or a network
//! error all mean unreachable.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::metrics::SANDBOX_PROBES;

/// Answers whether a preview URL is currently served by a live sandbox
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn is_alive(&self, url: &str) -> bool;
}

/// HTTP implementation of [`HealthProbe`]
#[derive(Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    /// Create a probe whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn is_alive(&self, url: &str) -> bool {
        let alive = match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(url, status = status.as_u16(), "Sandbox probe answered");
                status.is_success()
            }
            Err(e) => {
                debug!(url, error = %e, "Sandbox probe failed");
                false
            }
        };
        SANDBOX_PROBES
            .with_label_values(&[if alive { "alive" } else { "unreachable" }])
            .inc();
        alive
    }
}
