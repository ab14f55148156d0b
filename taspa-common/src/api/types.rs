//! Request/response types shared between services

use serde::{Deserialize, Serialize};

/// Runtime tuning parameters for one platform's workers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub proxies: Vec<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub requests_per_min: Option<u32>,
    #[serde(default)]
    pub concurrency: Option<u32>,
}

/// Partial update: only present fields overwrite the stored value
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PlatformConfigUpdate {
    pub proxies: Option<Vec<String>>,
    pub api_key: Option<String>,
    pub requests_per_min: Option<u32>,
    pub concurrency: Option<u32>,
}

impl PlatformConfig {
    pub fn apply(&mut self, update: PlatformConfigUpdate) {
        if let Some(proxies) = update.proxies {
            self.proxies = proxies;
        }
        if update.api_key.is_some() {
            self.api_key = update.api_key;
        }
        if update.requests_per_min.is_some() {
            self.requests_per_min = update.requests_per_min;
        }
        if update.concurrency.is_some() {
            self.concurrency = update.concurrency;
        }
    }
}

/// `GET /health` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

impl HealthResponse {
    pub fn ok(module: &str, version: &str) -> Self {
        Self {
            status: "ok".to_string(),
            module: module.to_string(),
            version: version.to_string(),
        }
    }
}
