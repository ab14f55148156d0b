//! Progress log persistence

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::models::LogRecord;
use crate::Result;

/// Append one log event, returning the stored record
pub async fn insert_log(
    pool: &SqlitePool,
    job_id: i64,
    level: &str,
    message: &str,
) -> Result<LogRecord> {
    let created_at = crate::time::now();

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO scrape_logs (job_id, level, message, created_at)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(job_id)
    .bind(level)
    .bind(message)
    .bind(created_at)
    .fetch_one(pool)
    .await?;

    Ok(LogRecord {
        id,
        job_id,
        level: level.to_string(),
        message: message.to_string(),
        created_at,
    })
}

/// All stored events of a job, oldest first
pub async fn list_logs_for_job(pool: &SqlitePool, job_id: i64) -> Result<Vec<LogRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, job_id, level, message, created_at
        FROM scrape_logs
        WHERE job_id = ?
        ORDER BY id
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        records.push(LogRecord {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            level: row.try_get("level")?,
            message: row.try_get("message")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        });
    }

    Ok(records)
}
