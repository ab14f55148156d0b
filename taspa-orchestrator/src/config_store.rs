//! Per-platform runtime configuration
//!
//! Held in process memory only: every start re-seeds defaults for all known
//! platforms. Concurrent updates are last-write-wins.

use std::collections::BTreeMap;

use taspa_common::api::{PlatformConfig, PlatformConfigUpdate};
use taspa_common::Platform;
use tokio::sync::RwLock;

#[derive(Debug)]
pub struct ConfigStore {
    configs: RwLock<BTreeMap<Platform, PlatformConfig>>,
}

impl ConfigStore {
    /// Store with default config for every known platform
    pub fn seeded() -> Self {
        let configs = Platform::ALL
            .into_iter()
            .map(|platform| (platform, PlatformConfig::default()))
            .collect();

        Self { configs: RwLock::new(configs) }
    }

    pub async fn get(&self, platform: Platform) -> Option<PlatformConfig> {
        self.configs.read().await.get(&platform).cloned()
    }

    /// Snapshot of every platform's config keyed by tag
    pub async fn all(&self) -> BTreeMap<String, PlatformConfig> {
        self.configs
            .read()
            .await
            .iter()
            .map(|(platform, config)| (platform.as_str().to_string(), config.clone()))
            .collect()
    }

    /// Apply a partial update, returning the resulting config
    pub async fn update(&self, platform: Platform, update: PlatformConfigUpdate) -> PlatformConfig {
        let mut configs = self.configs.write().await;
        let config = configs.entry(platform).or_default();
        config.apply(update);
        config.clone()
    }
}
