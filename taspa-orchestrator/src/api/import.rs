//! Bulk import endpoint
//!
//! `POST /import/{platform}-{csv|json}?direction_id=N` with a multipart
//! `file` field.

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use serde::Deserialize;
use taspa_common::Platform;

use crate::error::{ApiError, ApiResult};
use crate::import::{self, ImportError, ImportFormat, ImportReport};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    #[serde(alias = "scope_id")]
    pub direction_id: Option<i64>,
}

/// Split `vk-csv` into platform and format
pub fn parse_target(target: &str) -> ApiResult<(Platform, ImportFormat)> {
    let (tag, format) = target
        .rsplit_once('-')
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown import target: {}", target)))?;

    let format = match format {
        "csv" => ImportFormat::Csv,
        "json" => ImportFormat::Json,
        other => return Err(ApiError::BadRequest(format!("Unsupported format: {}", other))),
    };

    Ok((tag.parse()?, format))
}

/// POST /import/:target
pub async fn import_file(
    State(state): State<AppState>,
    Path(target): Path<String>,
    Query(query): Query<ImportQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<ImportReport>> {
    let (platform, format) = parse_target(&target)?;
    let direction_id = query
        .direction_id
        .ok_or_else(|| ApiError::BadRequest("Missing direction_id".to_string()))?;

    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;
            file = Some(bytes);
        }
    }
    let file = file.ok_or_else(|| ApiError::BadRequest("Missing file field".to_string()))?;

    let report = import::import_batch(&state.db, platform, direction_id, format, &file)
        .await
        .map_err(|e| match e {
            ImportError::UnknownDirection(id) => {
                ApiError::NotFound(format!("Direction not found: {}", id))
            }
            ImportError::Malformed(msg) => ApiError::BadRequest(msg),
            ImportError::Store(e) => ApiError::Common(e),
        })?;

    Ok(Json(report))
}
