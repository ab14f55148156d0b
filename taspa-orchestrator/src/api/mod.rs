//! HTTP API handlers for taspa-orchestrator

pub mod auth;
pub mod config;
pub mod health;
pub mod import;
pub mod jobs;

pub use auth::require_developer;
pub use config::{get_all_config, get_config, update_config};
pub use health::health_routes;
pub use import::import_file;
pub use jobs::{create_job, get_job, list_jobs, stop_job};
