//! Set-based child merge
//!
//! Children are written in chunks of `CHUNK_SIZE`, one transaction per chunk.
//! Each chunk gets a fresh insert token: the upsert writes it only on the
//! insert path and returns `insert_token = <token>` per row, which tells
//! newly inserted rows from updated ones without a separate existence check.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use taspa_common::db::rows_per_statement;
use taspa_common::Platform;
use tracing::{debug, error};
use uuid::Uuid;

use super::mapping::{child_columns, Cell, ChildRow};
use super::RowError;

/// Rows per merge transaction
pub const CHUNK_SIZE: usize = 5_000;

/// Child row with its parent resolved to a row id
#[derive(Debug, Clone)]
pub struct ResolvedChild {
    pub row: usize,
    pub parent_id: i64,
    pub child: ChildRow,
}

/// Counts from merging one batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeCounts {
    pub imported: u64,
    pub updated: u64,
}

/// Merge all rows chunk by chunk
///
/// A failing chunk is rolled back and reported in `errors`; later chunks
/// still run.
pub async fn merge_children(
    pool: &SqlitePool,
    platform: Platform,
    rows: &[ResolvedChild],
    scraped_at: DateTime<Utc>,
    errors: &mut Vec<RowError>,
) -> MergeCounts {
    let mut counts = MergeCounts::default();

    for chunk in rows.chunks(CHUNK_SIZE) {
        match merge_chunk(pool, platform, chunk, scraped_at).await {
            Ok(chunk_counts) => {
                counts.imported += chunk_counts.imported;
                counts.updated += chunk_counts.updated;
            }
            Err(e) => {
                let (first, last) = row_range(chunk);
                error!(platform = %platform, first, last, "Import chunk rolled back: {}", e);
                errors.push(RowError::new(
                    first,
                    format!("Rows {}-{}: chunk rolled back: {}", first, last, e),
                ));
            }
        }
    }

    counts
}

async fn merge_chunk(
    pool: &SqlitePool,
    platform: Platform,
    chunk: &[ResolvedChild],
    scraped_at: DateTime<Utc>,
) -> Result<MergeCounts, sqlx::Error> {
    let schema = platform.schema();
    let columns = child_columns(platform);
    let token = Uuid::new_v4().to_string();

    // fk, key, attributes, scraped_at, insert_token
    let binds_per_row = columns.len() + 4;

    let mut counts = MergeCounts::default();
    let mut tx = pool.begin().await?;

    for statement_rows in chunk.chunks(rows_per_statement(binds_per_row)) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}, {}, {}, scraped_at, insert_token) ",
            schema.child_table,
            schema.child_parent_fk,
            schema.child_key,
            columns.join(", ")
        ));

        qb.push_values(statement_rows, |mut b, resolved| {
            b.push_bind(resolved.parent_id)
                .push_bind(resolved.child.natural_key.clone());
            for cell in &resolved.child.cells {
                match cell {
                    Cell::Text(value) => b.push_bind(value.clone()),
                    Cell::Int(value) => b.push_bind(*value),
                    Cell::Time(value) => b.push_bind(*value),
                };
            }
            b.push_bind(scraped_at).push_bind(token.clone());
        });

        let assignments: Vec<String> = columns
            .iter()
            .chain(std::iter::once(&"scraped_at"))
            .map(|column| format!("{column} = excluded.{column}"))
            .collect();
        qb.push(format!(
            " ON CONFLICT ({}, {}) DO UPDATE SET {}",
            schema.child_parent_fk,
            schema.child_key,
            assignments.join(", ")
        ));
        qb.push(" RETURNING insert_token = ")
            .push_bind(token.clone())
            .push(" AS inserted");

        let returned = qb.build().fetch_all(&mut *tx).await?;
        for row in returned {
            let inserted: i64 = row.try_get("inserted")?;
            if inserted != 0 {
                counts.imported += 1;
            } else {
                counts.updated += 1;
            }
        }
    }

    tx.commit().await?;
    debug!(
        platform = %platform,
        rows = chunk.len(),
        imported = counts.imported,
        updated = counts.updated,
        "Import chunk committed"
    );

    Ok(counts)
}

fn row_range(chunk: &[ResolvedChild]) -> (usize, usize) {
    let first = chunk.iter().map(|r| r.row).min().unwrap_or(0);
    let last = chunk.iter().map(|r| r.row).max().unwrap_or(0);
    (first, last)
}
