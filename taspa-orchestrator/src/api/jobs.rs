//! Job endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use taspa_common::db::{jobs, Job};
use taspa_common::Platform;
use tracing::info;

use crate::dispatcher::{self, DispatchError};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Upper bound for `GET /jobs`
pub const MAX_LIST_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    #[serde(alias = "platform_tag")]
    pub service_name: String,
    #[serde(alias = "scope_id")]
    pub direction_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub status: &'static str,
}

/// POST /jobs
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<Json<Job>> {
    let platform: Platform = request.service_name.parse()?;

    let broker = state.broker.as_ref();
    let job = dispatcher::create_job(&state.db, broker, platform, request.direction_id)
        .await
        .map_err(|e| match e {
            DispatchError::UnknownDirection(id) => {
                ApiError::NotFound(format!("Direction not found: {}", id))
            }
            DispatchError::Publish(e) => ApiError::Unavailable(e.to_string()),
            DispatchError::Store(e) => ApiError::Common(e),
        })?;

    Ok(Json(job))
}

/// GET /jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Json<Job>> {
    jobs::get_job(&state.db, job_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {}", job_id)))
}

/// GET /jobs?limit=N (most recent first)
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    let limit = query.limit.unwrap_or(MAX_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    Ok(Json(jobs::list_jobs(&state.db, limit).await?))
}

/// POST /jobs/:id/stop
///
/// Advisory: workers notice the new status before their next step.
pub async fn stop_job(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Json<StopResponse>> {
    if !jobs::stop_job(&state.db, job_id).await? {
        return Err(ApiError::NotFound(format!("Job not found: {}", job_id)));
    }

    info!(job_id, "Job stopped by operator");
    Ok(Json(StopResponse { status: "stopped" }))
}
