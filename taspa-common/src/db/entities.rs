//! Parent entity (group/account) persistence
//!
//! Parents are unique on `(direction_id, natural key)`. Workers register
//! them idempotently; imports upsert them set-wise and read back the id map.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;

use super::rows_per_statement;
use crate::platform::Platform;
use crate::Result;

/// Descriptive fields of a parent entity as last seen in an import batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentDraft {
    pub natural_key: String,
    pub name: Option<String>,
    pub url: Option<String>,
}

/// Register a parent by natural key if missing; returns whether it was created
pub async fn register_parent(
    pool: &SqlitePool,
    platform: Platform,
    direction_id: i64,
    natural_key: &str,
) -> Result<bool> {
    let schema = platform.schema();

    let result = sqlx::query(&format!(
        "INSERT INTO {table} (direction_id, {key}) VALUES (?, ?) \
         ON CONFLICT (direction_id, {key}) DO NOTHING",
        table = schema.parent_table,
        key = schema.parent_key,
    ))
    .bind(direction_id)
    .bind(natural_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Insert or update every parent in one set-based pass
///
/// Existing rows get their display fields and `scraped_at` overwritten
/// (last write wins).
pub async fn upsert_parents(
    conn: &mut SqliteConnection,
    platform: Platform,
    direction_id: i64,
    parents: &[ParentDraft],
    scraped_at: DateTime<Utc>,
) -> Result<()> {
    let schema = platform.schema();

    for batch in parents.chunks(rows_per_statement(5)) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {} (direction_id, {}, name, url, scraped_at) ",
            schema.parent_table, schema.parent_key
        ));
        qb.push_values(batch, |mut b, parent| {
            b.push_bind(direction_id)
                .push_bind(parent.natural_key.clone())
                .push_bind(parent.name.clone())
                .push_bind(parent.url.clone())
                .push_bind(scraped_at);
        });
        qb.push(format!(
            " ON CONFLICT (direction_id, {}) DO UPDATE SET \
             name = excluded.name, url = excluded.url, scraped_at = excluded.scraped_at",
            schema.parent_key
        ));

        qb.build().execute(&mut *conn).await?;
    }

    Ok(())
}

/// Natural key → row id for every parent of the direction, in one read
pub async fn parent_ids(
    conn: &mut SqliteConnection,
    platform: Platform,
    direction_id: i64,
) -> Result<HashMap<String, i64>> {
    let schema = platform.schema();

    let rows = sqlx::query(&format!(
        "SELECT {key} AS natural_key, id FROM {table} WHERE direction_id = ?",
        key = schema.parent_key,
        table = schema.parent_table,
    ))
    .bind(direction_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut ids = HashMap::with_capacity(rows.len());
    for row in &rows {
        let key: String = row.try_get("natural_key")?;
        let id: i64 = row.try_get("id")?;
        ids.insert(key, id);
    }

    Ok(ids)
}
