//! Platform config endpoints

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    Json,
};
use taspa_common::api::{PlatformConfig, PlatformConfigUpdate};
use taspa_common::Platform;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

fn known_platform(tag: &str) -> ApiResult<Platform> {
    tag.parse()
        .map_err(|_| ApiError::NotFound(format!("Unknown platform: {}", tag)))
}

/// GET /config
pub async fn get_all_config(
    State(state): State<AppState>,
) -> Json<BTreeMap<String, PlatformConfig>> {
    Json(state.configs.all().await)
}

/// GET /config/:platform
pub async fn get_config(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> ApiResult<Json<PlatformConfig>> {
    let platform = known_platform(&tag)?;
    state
        .configs
        .get(platform)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown platform: {}", tag)))
}

/// PUT /config/:platform (partial update)
pub async fn update_config(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    Json(update): Json<PlatformConfigUpdate>,
) -> ApiResult<Json<PlatformConfig>> {
    let platform = known_platform(&tag)?;
    let config = state.configs.update(platform, update).await;

    info!(
        platform = %platform,
        proxies = config.proxies.len(),
        requests_per_min = ?config.requests_per_min,
        concurrency = ?config.concurrency,
        "Platform config updated"
    );
    Ok(Json(config))
}
