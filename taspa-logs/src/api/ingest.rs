//! Event ingestion and history
//!
//! Both ingest routes persist the event once, then hand it to the hub with
//! the matching audience.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use taspa_common::db::logs;
use taspa_common::events::{LogEvent, LogPayload};
use tracing::debug;

use crate::error::ApiResult;
use crate::hub::{Audience, RoutedEvent};
use crate::AppState;

async fn persist(state: &AppState, event: &LogEvent) -> ApiResult<LogPayload> {
    let record = logs::insert_log(&state.db, event.job_id, &event.level, &event.message).await?;
    Ok(LogPayload::from(record))
}

/// POST /logs
///
/// Delivered to the job's room and the authorized room.
pub async fn ingest_log(
    State(state): State<AppState>,
    Json(event): Json<LogEvent>,
) -> ApiResult<Json<Value>> {
    let payload = persist(&state, &event).await?;
    let viewers = state.hub.publish(RoutedEvent {
        audience: Audience::Rooms { job_id: event.job_id },
        payload,
    });
    debug!(job_id = event.job_id, level = %event.level, viewers, "Log event ingested");

    Ok(Json(json!({ "status": "ok" })))
}

/// POST /logs/broadcast
///
/// Delivered to every connected viewer regardless of rooms.
pub async fn broadcast_log(
    State(state): State<AppState>,
    Json(event): Json<LogEvent>,
) -> ApiResult<Json<Value>> {
    let payload = persist(&state, &event).await?;
    let viewers = state.hub.publish(RoutedEvent { audience: Audience::Everyone, payload });
    debug!(job_id = event.job_id, viewers, "Log event broadcast");

    Ok(Json(json!({ "status": "ok" })))
}

/// GET /logs/jobs/:job_id
///
/// Stored events of one job, oldest first.
pub async fn job_history(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Json<Vec<LogPayload>>> {
    let records = logs::list_logs_for_job(&state.db, job_id).await?;
    Ok(Json(records.into_iter().map(LogPayload::from).collect()))
}
