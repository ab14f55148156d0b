//! Bulk import/upsert engine
//!
//! Three phases per uploaded batch:
//! 1. Parse and stage: map every record, collect row errors, and collapse
//!    duplicate parents and children (last occurrence wins).
//! 2. Resolve parents: one transaction registers sources, upserts every
//!    distinct parent and reads back the `natural key -> id` map.
//! 3. Merge children in bounded chunks (see [`merge`]).

pub mod mapping;
pub mod merge;
pub mod parse;

pub use parse::ImportFormat;

use indexmap::IndexMap;
use serde::Serialize;
use sqlx::SqlitePool;
use taspa_common::db::{directions, entities};
use taspa_common::db::entities::ParentDraft;
use taspa_common::Platform;
use thiserror::Error;
use tracing::{info, warn};

use mapping::StagedRow;
use merge::ResolvedChild;

/// Errors reported to the client
pub const MAX_REPORTED_ERRORS: usize = 50;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Direction not found: {0}")]
    UnknownDirection(i64),

    #[error("{0}")]
    Malformed(String),

    #[error(transparent)]
    Store(#[from] taspa_common::Error),
}

/// Error message tied to the input row it concerns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self { row, message: message.into() }
    }
}

/// Outcome of one import call
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImportReport {
    pub direction_id: i64,
    pub platform: String,
    pub imported: u64,
    pub updated: u64,
    pub errors: Vec<String>,
}

/// Import an uploaded file into `direction_id`
pub async fn import_batch(
    pool: &SqlitePool,
    platform: Platform,
    direction_id: i64,
    format: ImportFormat,
    bytes: &[u8],
) -> Result<ImportReport, ImportError> {
    if !directions::direction_exists(pool, direction_id).await? {
        return Err(ImportError::UnknownDirection(direction_id));
    }

    let parsed = parse::parse(format, bytes)?;
    let mut errors = parsed.errors;
    let scraped_at = taspa_common::time::now();

    // Phase 1: stage, collapsing duplicates
    let mut parents: IndexMap<String, ParentDraft> = IndexMap::new();
    let mut children: IndexMap<(String, String), StagedRow> = IndexMap::new();
    for record in &parsed.records {
        match mapping::stage(platform, record, scraped_at) {
            Ok(staged) => {
                parents.insert(staged.parent.natural_key.clone(), staged.parent.clone());
                let key = (staged.parent.natural_key.clone(), staged.child.natural_key.clone());
                children.insert(key, staged);
            }
            Err(message) => errors.push(RowError::new(record.row, message)),
        }
    }

    // Phase 2: resolve parents in one transaction
    let parents: Vec<ParentDraft> = parents.into_values().collect();
    let parent_ids = {
        let mut tx = pool.begin().await.map_err(taspa_common::Error::from)?;
        let identifiers: Vec<String> = parents.iter().map(|p| p.natural_key.clone()).collect();
        directions::ensure_sources(&mut tx, direction_id, platform.source_type(), &identifiers)
            .await?;
        entities::upsert_parents(&mut tx, platform, direction_id, &parents, scraped_at).await?;
        let ids = entities::parent_ids(&mut tx, platform, direction_id).await?;
        tx.commit().await.map_err(taspa_common::Error::from)?;
        ids
    };

    let mut resolved = Vec::with_capacity(children.len());
    for ((parent_key, _), staged) in children {
        match parent_ids.get(&parent_key) {
            Some(&parent_id) => resolved.push(ResolvedChild {
                row: staged.row,
                parent_id,
                child: staged.child,
            }),
            None => {
                warn!(
                    platform = %platform,
                    direction_id,
                    row = staged.row,
                    parent = %parent_key,
                    "Parent not resolved, child skipped"
                );
                errors.push(RowError::new(
                    staged.row,
                    format!("Row {}: parent '{}' could not be resolved", staged.row, parent_key),
                ));
            }
        }
    }

    // Phase 3: merge children chunk by chunk
    let counts = merge::merge_children(pool, platform, &resolved, scraped_at, &mut errors).await;

    info!(
        platform = %platform,
        direction_id,
        format = format.as_str(),
        records = parsed.records.len(),
        parents = parents.len(),
        imported = counts.imported,
        updated = counts.updated,
        errors = errors.len(),
        "Import finished"
    );

    // Phases report in their own order; the first rows win the cap
    errors.sort_by_key(|e| e.row);
    let errors = errors
        .into_iter()
        .take(MAX_REPORTED_ERRORS)
        .map(|e| e.message)
        .collect();

    Ok(ImportReport {
        direction_id,
        platform: platform.as_str().to_string(),
        imported: counts.imported,
        updated: counts.updated,
        errors,
    })
}
