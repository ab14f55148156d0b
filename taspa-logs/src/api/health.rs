//! Health check endpoint

use axum::{routing::get, Json, Router};
use taspa_common::api::HealthResponse;

use crate::AppState;

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::ok("taspa-logs", env!("CARGO_PKG_VERSION")))
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
