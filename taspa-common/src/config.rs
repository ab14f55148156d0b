//! Bootstrap configuration loading
//!
//! Every TASPA process reads the same TOML bootstrap file. Resolution order
//! for each value:
//! 1. Command-line argument (highest priority, applied by the binary)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error: the process logs a warning and
//! starts with compiled defaults.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "TASPA_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to the shared SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub services: ServiceUrls,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub import: ImportConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error); `RUST_LOG` still applies on top
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Job announcement broker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// `memory` for the in-process broker, or a `nats://` URL
    #[serde(default = "default_broker_url")]
    pub url: String,

    /// Subject prefix; announcements are published on `<prefix>.<service_name>`
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,

    /// JetStream stream name holding announcements
    #[serde(default = "default_stream_name")]
    pub stream: String,

    /// Subscribe to the platform's own subject instead of all announcements
    #[serde(default)]
    pub platform_routing: bool,
}

/// Where the services reach each other over HTTP
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceUrls {
    #[serde(default = "default_orchestrator_url")]
    pub orchestrator_url: String,

    #[serde(default = "default_logs_url")]
    pub logs_url: String,
}

/// Token validation for live log viewers
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
}

/// Bulk import limits
#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("taspa").join("taspa.db"))
        .unwrap_or_else(|| PathBuf::from("./taspa_data/taspa.db"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_broker_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}

fn default_subject_prefix() -> String {
    "scrape.jobs".to_string()
}

fn default_stream_name() -> String {
    "SCRAPE_JOBS".to_string()
}

fn default_orchestrator_url() -> String {
    "http://127.0.0.1:8005".to_string()
}

fn default_logs_url() -> String {
    "http://127.0.0.1:8010".to_string()
}

fn default_jwt_secret() -> String {
    "dev-secret".to_string()
}

fn default_max_upload_bytes() -> usize {
    64 * 1024 * 1024
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            subject_prefix: default_subject_prefix(),
            stream: default_stream_name(),
            platform_routing: false,
        }
    }
}

impl Default for ServiceUrls {
    fn default() -> Self {
        Self {
            orchestrator_url: default_orchestrator_url(),
            logs_url: default_logs_url(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { jwt_secret: default_jwt_secret() }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self { max_upload_bytes: default_max_upload_bytes() }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            logging: LoggingConfig::default(),
            broker: BrokerConfig::default(),
            services: ServiceUrls::default(),
            auth: AuthConfig::default(),
            import: ImportConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Parse a config file's contents
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load the bootstrap config with graceful degradation
    ///
    /// `explicit` is the `--config` argument. An explicit path that cannot be
    /// read is an error; a missing default file only produces a warning.
    /// Environment overrides are applied afterwards.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
                })?;
                info!("Loaded config file: {}", path.display());
                Self::from_toml_str(&content)?
            }
            None => match locate_config_file() {
                Some(path) => {
                    let content = std::fs::read_to_string(&path)?;
                    info!("Loaded config file: {}", path.display());
                    Self::from_toml_str(&content)?
                }
                None => {
                    warn!("No config file found, using compiled defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `TASPA_*` environment variables over file values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TASPA_DATABASE") {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(url) = std::env::var("TASPA_BROKER_URL") {
            self.broker.url = url;
        }
        if let Ok(url) = std::env::var("TASPA_ORCHESTRATOR_URL") {
            self.services.orchestrator_url = url;
        }
        if let Ok(url) = std::env::var("TASPA_LOGS_URL") {
            self.services.logs_url = url;
        }
        if let Ok(secret) = std::env::var("TASPA_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
    }
}

/// Find the config file: `$TASPA_CONFIG`, then user config dir, then `/etc`
fn locate_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        warn!("{} points to a missing file: {}", CONFIG_ENV, path.display());
    }

    let user_config = dirs::config_dir().map(|d| d.join("taspa").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/taspa/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}
