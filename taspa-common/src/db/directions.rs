//! Directions (scopes) and their sources
//!
//! Direction CRUD belongs to the directions service; the scraping services
//! only check existence, read sources, and register sources seen in imports.

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use super::rows_per_statement;
use crate::Result;

/// Create a direction, returning its id
pub async fn create_direction(pool: &SqlitePool, name: &str) -> Result<i64> {
    let id: i64 = sqlx::query_scalar("INSERT INTO directions (name) VALUES (?) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await?;

    Ok(id)
}

pub async fn direction_exists(pool: &SqlitePool, direction_id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM directions WHERE id = ?")
        .bind(direction_id)
        .fetch_optional(pool)
        .await?;

    Ok(found.is_some())
}

/// Add one source if it is not already present; returns whether it was added
pub async fn add_source(
    pool: &SqlitePool,
    direction_id: i64,
    source_type: &str,
    source_identifier: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO direction_sources (direction_id, source_type, source_identifier)
        VALUES (?, ?, ?)
        ON CONFLICT (direction_id, source_type, source_identifier) DO NOTHING
        "#,
    )
    .bind(direction_id)
    .bind(source_type)
    .bind(source_identifier)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Source identifiers of one type, in insertion order
pub async fn load_sources(
    pool: &SqlitePool,
    direction_id: i64,
    source_type: &str,
) -> Result<Vec<String>> {
    let sources = sqlx::query_scalar(
        r#"
        SELECT source_identifier
        FROM direction_sources
        WHERE direction_id = ? AND source_type = ?
        ORDER BY id
        "#,
    )
    .bind(direction_id)
    .bind(source_type)
    .fetch_all(pool)
    .await?;

    Ok(sources)
}

/// Register many sources in the caller's transaction (insert-or-ignore)
pub async fn ensure_sources(
    conn: &mut SqliteConnection,
    direction_id: i64,
    source_type: &str,
    identifiers: &[String],
) -> Result<()> {
    for batch in identifiers.chunks(rows_per_statement(3)) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO direction_sources (direction_id, source_type, source_identifier) ",
        );
        qb.push_values(batch, |mut b, identifier| {
            b.push_bind(direction_id)
                .push_bind(source_type.to_string())
                .push_bind(identifier.clone());
        });
        qb.push(" ON CONFLICT (direction_id, source_type, source_identifier) DO NOTHING");

        qb.build().execute(&mut *conn).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    #[tokio::test]
    async fn test_sources_are_unique_per_direction_and_type() {
        let pool = open_in_memory().await.unwrap();
        let direction = create_direction(&pool, "education").await.unwrap();

        assert!(add_source(&pool, direction, "vk_group", "club1").await.unwrap());
        assert!(!add_source(&pool, direction, "vk_group", "club1").await.unwrap());
        assert!(add_source(&pool, direction, "tiktok_account", "club1").await.unwrap());

        let vk = load_sources(&pool, direction, "vk_group").await.unwrap();
        assert_eq!(vk, vec!["club1".to_string()]);
    }

    #[tokio::test]
    async fn test_ensure_sources_ignores_existing() {
        let pool = open_in_memory().await.unwrap();
        let direction = create_direction(&pool, "sport").await.unwrap();
        add_source(&pool, direction, "vk_group", "a").await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        ensure_sources(&mut conn, direction, "vk_group", &["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        drop(conn);

        let sources = load_sources(&pool, direction, "vk_group").await.unwrap();
        assert_eq!(sources, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_direction_exists() {
        let pool = open_in_memory().await.unwrap();
        let id = create_direction(&pool, "music").await.unwrap();

        assert!(direction_exists(&pool, id).await.unwrap());
        assert!(!direction_exists(&pool, id + 100).await.unwrap());
    }
}
