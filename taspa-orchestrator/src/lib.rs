//! taspa-orchestrator library
//!
//! Job dispatcher, per-platform runtime config and the bulk import engine,
//! behind one HTTP surface.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use sqlx::SqlitePool;
use taspa_common::broker::Broker;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config_store;
pub mod dispatcher;
pub mod error;
pub mod import;

pub use config_store::ConfigStore;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Shared entity store
    pub db: SqlitePool,
    /// Job announcement broker
    pub broker: Arc<dyn Broker>,
    /// In-memory platform configs
    pub configs: Arc<ConfigStore>,
    /// Maximum accepted request body (uploads)
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(db: SqlitePool, broker: Arc<dyn Broker>, max_upload_bytes: usize) -> Self {
        Self {
            db,
            broker,
            configs: Arc::new(ConfigStore::seeded()),
            max_upload_bytes,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    // Operator routes (developer role)
    let protected = Router::new()
        .route("/jobs", post(api::create_job).get(api::list_jobs))
        .route("/jobs/:id", get(api::get_job))
        .route("/jobs/:id/stop", post(api::stop_job))
        .route("/config", get(api::get_all_config))
        .route("/config/:platform", get(api::get_config).put(api::update_config))
        .route("/import/:target", post(api::import_file))
        .layer(middleware::from_fn(api::require_developer));

    let body_limit = state.max_upload_bytes;

    Router::new()
        .merge(protected)
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
