#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use taskbelt_core::application::{EnqueueRequest, QueueManager, WorkerSettings};
use taskbelt_core::domain::{EventType, StateCounts};
use taskbelt_core::port::time_provider::SystemTimeProvider;
use taskbelt_infra_sqlite::{create_pool, run_migrations, SqliteJobStore};

pub async fn manager() -> Arc<QueueManager> {
    manager_with_retries(3).await
}

pub async fn manager_with_retries(max_retries: i64) -> Arc<QueueManager> {
    let pool = create_pool(":memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    let time = Arc::new(SystemTimeProvider);
    let store = Arc::new(SqliteJobStore::new(pool, time.clone()));
    Arc::new(QueueManager::new(store, time, max_retries))
}

pub fn request(id: &str, command: &str) -> EnqueueRequest {
    EnqueueRequest {
        id: id.to_string(),
        command: command.to_string(),
        priority: None,
        max_retries: None,
        run_at: None,
    }
}

/// Worker settings tuned for test speed: tight polling and near-zero
/// backoff so retry scenarios finish in milliseconds.
pub fn fast_settings() -> WorkerSettings {
    WorkerSettings {
        poll_interval: Duration::from_millis(20),
        job_timeout: Duration::from_secs(10),
        backoff_base: 0.01,
    }
}

/// Poll the state counts until `pred` holds or `timeout` elapses.
pub async fn wait_for_counts<F>(manager: &QueueManager, timeout: Duration, pred: F) -> bool
where
    F: Fn(&StateCounts) -> bool,
{
    let deadline = std::time::Instant::now() + timeout;
    loop {
        let counts = manager.stats().await.unwrap();
        if pred(&counts) {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Event types recorded for one job, oldest first.
pub async fn events_for(manager: &QueueManager, id: &str) -> Vec<EventType> {
    let mut events: Vec<_> = manager
        .metrics(1000)
        .await
        .unwrap()
        .recent
        .into_iter()
        .filter(|e| e.job_id == id)
        .collect();
    events.sort_by_key(|e| e.seq);
    events.into_iter().map(|e| e.event_type).collect()
}
