// Migration Runner

use sqlx::SqlitePool;
use taskbelt_core::error::{QueueError, Result};
use tracing::info;

/// Apply pending schema migrations sequentially.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let table_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
    )
    .fetch_one(pool)
    .await
    .map_err(storage_err)?;

    let current_version: i64 = if table_exists > 0 {
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(storage_err)?
            .unwrap_or(0)
    } else {
        0
    };

    if current_version < 1 {
        info!("applying migration 001: initial schema");
        apply_migration(pool, include_str!("../migrations/001_initial_schema.sql")).await?;
    }

    if current_version < 2 {
        info!("applying migration 002: worker heartbeats");
        apply_migration(pool, include_str!("../migrations/002_worker_health.sql")).await?;
    }

    Ok(())
}

/// Run one migration file, statement by statement, in a transaction.
async fn apply_migration(pool: &SqlitePool, sql: &str) -> Result<()> {
    let mut tx = pool.begin().await.map_err(storage_err)?;

    for statement in sql.split(';') {
        let clean: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();

        if !clean.is_empty() {
            sqlx::query(&clean).execute(&mut *tx).await.map_err(storage_err)?;
        }
    }

    tx.commit().await.map_err(storage_err)?;
    Ok(())
}

fn storage_err(err: sqlx::Error) -> QueueError {
    QueueError::Storage(format!("migration failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_pool;

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_pool(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        for table in ["jobs", "job_events", "worker_health"] {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&pool)
                .await
                .unwrap();
            assert_eq!(count, 0, "table {table} should exist and be empty");
        }
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = create_pool(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let version: i64 =
            sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(version, 2);
    }
}
