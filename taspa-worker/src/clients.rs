//! Outbound collaborators of a worker
//!
//! Progress events go to the log service and platform config comes from the
//! orchestrator. Both are best effort: a failed call is logged here and
//! never fails the job.

use std::time::Duration;

use async_trait::async_trait;
use taspa_common::api::{PlatformConfig, ROLES_HEADER};
use taspa_common::events::LogEvent;
use taspa_common::Platform;
use tracing::{debug, warn};

/// Timeout for every outbound call
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Role presented to the other services
const SERVICE_ROLE: &str = "developer";

/// Receives job progress events
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn send(&self, event: LogEvent);
}

/// Provides the current runtime config of a platform
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// `None` when the config could not be fetched
    async fn fetch(&self, platform: Platform) -> Option<PlatformConfig>;
}

/// Posts events to `POST <logs_url>/logs`
pub struct HttpProgressSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpProgressSink {
    pub fn new(logs_url: &str) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/logs", logs_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ProgressSink for HttpProgressSink {
    async fn send(&self, event: LogEvent) {
        let result = self
            .client
            .post(&self.endpoint)
            .header(ROLES_HEADER, SERVICE_ROLE)
            .json(&event)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(job_id = event.job_id, "Progress event delivered");
            }
            Ok(response) => warn!(
                job_id = event.job_id,
                status = %response.status(),
                "Log service rejected progress event"
            ),
            Err(e) => warn!(job_id = event.job_id, "Failed to deliver progress event: {}", e),
        }
    }
}

/// Reads `GET <orchestrator_url>/config/<platform>`
pub struct HttpConfigSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpConfigSource {
    pub fn new(orchestrator_url: &str) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: orchestrator_url.trim_end_matches('/').to_string(),
        })
    }

    async fn try_fetch(&self, platform: Platform) -> reqwest::Result<PlatformConfig> {
        self.client
            .get(format!("{}/config/{}", self.base_url, platform.as_str()))
            .header(ROLES_HEADER, SERVICE_ROLE)
            .send()
            .await?
            .error_for_status()?
            .json::<PlatformConfig>()
            .await
    }
}

#[async_trait]
impl ConfigSource for HttpConfigSource {
    async fn fetch(&self, platform: Platform) -> Option<PlatformConfig> {
        match self.try_fetch(platform).await {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(platform = %platform, "Config fetch failed, continuing without: {}", e);
                None
            }
        }
    }
}
