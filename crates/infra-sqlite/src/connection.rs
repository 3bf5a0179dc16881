// SQLite connection pool setup.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use taskbelt_core::error::{QueueError, Result};

/// Create a SQLite pool with WAL mode and a busy timeout.
///
/// WAL keeps readers (list/stats/metrics) from blocking behind claim
/// transactions; the busy timeout absorbs transient writer contention.
///
/// # Configuration
/// - `TASKBELT_POOL_SIZE`: max connections (default: 10)
/// - `TASKBELT_POOL_TIMEOUT`: busy timeout in seconds (default: 5)
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let mut max_connections: u32 = std::env::var("TASKBELT_POOL_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let busy_timeout_secs: u64 = std::env::var("TASKBELT_POOL_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    // Each pooled connection to an in-memory database would get its own
    // private database; cap the pool so tests see one store.
    if database_url.contains(":memory:") || database_url.contains("mode=memory") {
        max_connections = 1;
    }

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| QueueError::Storage(format!("invalid database url: {e}")))?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(busy_timeout_secs))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| QueueError::Storage(format!("pool creation failed: {e}")))?;

    Ok(pool)
}
