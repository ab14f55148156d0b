//! taspa-logs library
//!
//! Progress log broadcaster: persists events from workers and streams them
//! live to viewers scoped by room.

use axum::Router;
use sqlx::SqlitePool;
use taspa_common::api::TokenVerifier;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod hub;

pub use hub::LogHub;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Shared entity store
    pub db: SqlitePool,
    /// Live fan-out to connected viewers
    pub hub: LogHub,
    /// Viewer token validation
    pub verifier: TokenVerifier,
}

impl AppState {
    pub fn new(db: SqlitePool, jwt_secret: &str) -> Self {
        Self {
            db,
            hub: LogHub::default(),
            verifier: TokenVerifier::new(jwt_secret),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let producers = Router::new()
        .route("/logs", post(api::ingest_log))
        .route("/logs/broadcast", post(api::broadcast_log))
        .route("/logs/jobs/:job_id", get(api::job_history))
        .layer(middleware::from_fn(api::require_any_role));

    Router::new()
        .merge(producers)
        .route("/logs/stream", get(api::log_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
