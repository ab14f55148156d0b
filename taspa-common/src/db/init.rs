//! Database initialization
//!
//! Opens (or creates) the shared database file and creates every table the
//! services use. Table creation is idempotent, so each service runs it on
//! startup regardless of which process started first.

use crate::platform::Platform;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // WAL lets the orchestrator, workers and log service write the same file;
    // busy_timeout absorbs short writer-lock waits between them.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// Single connection: every pooled connection to `:memory:` would otherwise
/// see its own empty database.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_directions_tables(pool).await?;
    create_jobs_table(pool).await?;
    create_logs_table(pool).await?;
    create_vk_tables(pool).await?;
    create_social_tables(pool, Platform::Instagram).await?;
    create_social_tables(pool, Platform::Tiktok).await?;

    Ok(())
}

async fn create_directions_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS directions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS direction_sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            direction_id INTEGER NOT NULL REFERENCES directions(id) ON DELETE CASCADE,
            source_type TEXT NOT NULL,
            source_identifier TEXT NOT NULL,
            UNIQUE (direction_id, source_type, source_identifier)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_jobs_table(pool: &SqlitePool) -> Result<()> {
    // No foreign key on direction_id: jobs outlive the directions they scraped
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scrape_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service_name TEXT NOT NULL,
            direction_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            started_at TEXT,
            finished_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_logs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scrape_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL,
            level TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scrape_logs_job ON scrape_logs(job_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_vk_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vk_groups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            direction_id INTEGER NOT NULL REFERENCES directions(id) ON DELETE CASCADE,
            vk_group_id TEXT NOT NULL,
            name TEXT,
            url TEXT,
            scraped_at TEXT,
            UNIQUE (direction_id, vk_group_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // insert_token is written on insert only; upserts compare it to tell
    // inserted rows from updated ones
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vk_members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            vk_group_id INTEGER NOT NULL REFERENCES vk_groups(id) ON DELETE CASCADE,
            vk_user_id TEXT NOT NULL,
            full_name TEXT,
            gender TEXT,
            age INTEGER,
            city TEXT,
            university TEXT,
            school TEXT,
            last_recently TEXT,
            data_timestamp TEXT,
            scraped_at TEXT,
            insert_token TEXT,
            UNIQUE (vk_group_id, vk_user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_social_tables(pool: &SqlitePool, platform: Platform) -> Result<()> {
    let schema = platform.schema();

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {parent} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            direction_id INTEGER NOT NULL REFERENCES directions(id) ON DELETE CASCADE,
            {key} TEXT NOT NULL,
            url TEXT,
            name TEXT,
            scraped_at TEXT,
            UNIQUE (direction_id, {key})
        )
        "#,
        parent = schema.parent_table,
        key = schema.parent_key,
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {child} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            {fk} INTEGER NOT NULL REFERENCES {parent}(id) ON DELETE CASCADE,
            {key} TEXT NOT NULL,
            url TEXT,
            sex TEXT,
            city TEXT,
            data_timestamp TEXT,
            scraped_at TEXT,
            insert_token TEXT,
            UNIQUE ({fk}, {key})
        )
        "#,
        child = schema.child_table,
        fk = schema.child_parent_fk,
        parent = schema.parent_table,
        key = schema.child_key,
    ))
    .execute(pool)
    .await?;

    Ok(())
}
