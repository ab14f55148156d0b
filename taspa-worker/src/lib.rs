//! taspa-worker library
//!
//! A per-platform scrape worker: consumes job announcements, runs the jobs of
//! its own platform and reports progress to the log service.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use taspa_common::api::HealthResponse;
use taspa_common::Platform;
use tower_http::trace::TraceLayer;

pub mod clients;
pub mod consumer;
pub mod job_runner;

pub use clients::{ConfigSource, HttpConfigSource, HttpProgressSink, ProgressSink};
pub use consumer::{Consumer, ConsumerStats, StatsSnapshot};
pub use job_runner::{JobRunner, Outcome};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub platform: Platform,
    pub stats: Arc<ConsumerStats>,
}

impl AppState {
    pub fn new(platform: Platform, stats: Arc<ConsumerStats>) -> Self {
        Self { platform, stats }
    }

    /// Module name reported by the health check
    pub fn module_name(&self) -> String {
        format!("taspa-worker-{}", self.platform)
    }
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::ok(&state.module_name(), env!("CARGO_PKG_VERSION")))
}

/// GET /stats
async fn consumer_stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}

/// Build application router
///
/// Served while the consume loop runs on its own task.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(consumer_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
