//! Scrape job persistence
//!
//! Status transitions written by workers are conditional on the current
//! status, so an operator's `stopped` is never overwritten by a worker.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::models::{Job, JobStatus};
use crate::platform::Platform;
use crate::Result;

const JOB_COLUMNS: &str =
    "id, service_name, direction_id, status, created_at, started_at, finished_at";

fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let status: String = row.try_get("status")?;

    Ok(Job {
        id: row.try_get("id")?,
        service_name: row.try_get("service_name")?,
        direction_id: row.try_get("direction_id")?,
        status: status.parse()?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        started_at: row.try_get::<Option<DateTime<Utc>>, _>("started_at")?,
        finished_at: row.try_get::<Option<DateTime<Utc>>, _>("finished_at")?,
    })
}

/// Insert a new `queued` job
pub async fn insert_job(pool: &SqlitePool, platform: Platform, direction_id: i64) -> Result<Job> {
    let created_at = crate::time::now();

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO scrape_jobs (service_name, direction_id, status, created_at)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(platform.as_str())
    .bind(direction_id)
    .bind(JobStatus::Queued.as_str())
    .bind(created_at)
    .fetch_one(pool)
    .await?;

    Ok(Job {
        id,
        service_name: platform.as_str().to_string(),
        direction_id,
        status: JobStatus::Queued,
        created_at,
        started_at: None,
        finished_at: None,
    })
}

/// Delete a job row; returns whether a row was removed
///
/// Only used to undo an insert whose announcement could not be published.
pub async fn delete_job(pool: &SqlitePool, job_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM scrape_jobs WHERE id = ?")
        .bind(job_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Load a job by id
pub async fn get_job(pool: &SqlitePool, job_id: i64) -> Result<Option<Job>> {
    let row = sqlx::query(&format!("SELECT {} FROM scrape_jobs WHERE id = ?", JOB_COLUMNS))
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Most recent jobs first
pub async fn list_jobs(pool: &SqlitePool, limit: i64) -> Result<Vec<Job>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM scrape_jobs ORDER BY id DESC LIMIT ?",
        JOB_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Current status only
pub async fn job_status(pool: &SqlitePool, job_id: i64) -> Result<Option<JobStatus>> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM scrape_jobs WHERE id = ?")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    status.map(|s| s.parse()).transpose()
}

/// Operator stop: unconditionally `stopped` with `finished_at = now`
///
/// Returns false when the job does not exist.
pub async fn stop_job(pool: &SqlitePool, job_id: i64) -> Result<bool> {
    let result = sqlx::query("UPDATE scrape_jobs SET status = ?, finished_at = ? WHERE id = ?")
        .bind(JobStatus::Stopped.as_str())
        .bind(crate::time::now())
        .bind(job_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Worker claim: `queued → running` with `started_at = now`
///
/// Returns false if the job is missing or no longer queued.
pub async fn claim_job(pool: &SqlitePool, job_id: i64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE scrape_jobs SET status = ?, started_at = ? WHERE id = ? AND status = ?",
    )
    .bind(JobStatus::Running.as_str())
    .bind(crate::time::now())
    .bind(job_id)
    .bind(JobStatus::Queued.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Worker terminal write: `running → finished | failed` with `finished_at = now`
///
/// Returns false if the job left `running` in the meantime (operator stop).
pub async fn complete_job(pool: &SqlitePool, job_id: i64, status: JobStatus) -> Result<bool> {
    debug_assert!(matches!(status, JobStatus::Finished | JobStatus::Failed));

    let result = sqlx::query(
        "UPDATE scrape_jobs SET status = ?, finished_at = ? WHERE id = ? AND status = ?",
    )
    .bind(status.as_str())
    .bind(crate::time::now())
    .bind(job_id)
    .bind(JobStatus::Running.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    #[tokio::test]
    async fn test_insert_and_get() {
        let pool = open_in_memory().await.unwrap();
        let job = insert_job(&pool, Platform::Vk, 7).await.unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        let loaded = get_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(loaded.service_name, "vk");
        assert_eq!(loaded.direction_id, 7);
        assert_eq!(loaded.status, JobStatus::Queued);
        assert!(loaded.started_at.is_none());
    }

    #[tokio::test]
    async fn test_list_is_most_recent_first_and_limited() {
        let pool = open_in_memory().await.unwrap();
        for _ in 0..5 {
            insert_job(&pool, Platform::Tiktok, 1).await.unwrap();
        }

        let jobs = list_jobs(&pool, 3).await.unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(jobs[0].id > jobs[1].id && jobs[1].id > jobs[2].id);
    }

    #[tokio::test]
    async fn test_claim_only_from_queued() {
        let pool = open_in_memory().await.unwrap();
        let job = insert_job(&pool, Platform::Vk, 1).await.unwrap();

        assert!(claim_job(&pool, job.id).await.unwrap());
        // Second claim finds it running
        assert!(!claim_job(&pool, job.id).await.unwrap());
        assert!(!claim_job(&pool, 9999).await.unwrap());

        let loaded = get_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Running);
        assert!(loaded.started_at.is_some());
    }

    #[tokio::test]
    async fn test_stop_wins_over_worker_completion() {
        let pool = open_in_memory().await.unwrap();
        let job = insert_job(&pool, Platform::Vk, 1).await.unwrap();
        claim_job(&pool, job.id).await.unwrap();

        assert!(stop_job(&pool, job.id).await.unwrap());
        assert!(!complete_job(&pool, job.id, JobStatus::Finished).await.unwrap());

        assert_eq!(job_status(&pool, job.id).await.unwrap(), Some(JobStatus::Stopped));
    }

    #[tokio::test]
    async fn test_stop_missing_job() {
        let pool = open_in_memory().await.unwrap();
        assert!(!stop_job(&pool, 42).await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_is_unconditional() {
        let pool = open_in_memory().await.unwrap();
        let job = insert_job(&pool, Platform::Vk, 1).await.unwrap();
        claim_job(&pool, job.id).await.unwrap();
        complete_job(&pool, job.id, JobStatus::Failed).await.unwrap();

        assert!(stop_job(&pool, job.id).await.unwrap());
        let loaded = get_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Stopped);
        assert!(loaded.finished_at.is_some());
    }
}
