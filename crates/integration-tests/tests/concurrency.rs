// Multi-worker contention scenarios.

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use taskbelt_core::application::{shutdown_channel, WorkerPool};
use taskbelt_core::port::command_runner::mocks::MockRunner;
use taskbelt_core::port::time_provider::SystemTimeProvider;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_twenty_jobs_ten_workers_no_duplicates() {
    let manager = manager().await;
    for i in 0..20 {
        manager
            .enqueue(request(&format!("stress-{i:02}"), &format!("task {i:02}")))
            .await
            .unwrap();
    }

    let runner = Arc::new(MockRunner::always_succeeding().with_delay(Duration::from_millis(100)));
    let pool = Arc::new(WorkerPool::new(
        Arc::clone(&manager),
        runner.clone(),
        fast_settings(),
        Arc::new(SystemTimeProvider),
        10,
    ));
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let pool_task = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.run(shutdown_rx).await })
    };

    let started = std::time::Instant::now();
    assert!(
        wait_for_counts(&manager, Duration::from_secs(15), |c| c.completed == 20).await,
        "all 20 jobs must complete"
    );
    let elapsed = started.elapsed();

    shutdown_tx.shutdown();
    pool_task.await.unwrap().unwrap();

    // Every execution was handed out exactly once.
    assert_eq!(runner.call_count(), 20, "no job executed twice");
    let mut commands = runner.commands();
    commands.sort();
    let mut deduped = commands.clone();
    deduped.dedup();
    assert_eq!(commands, deduped);

    // The per-worker counters agree with the total.
    let processed: i64 = pool.health().iter().map(|h| h.jobs_processed).sum();
    assert_eq!(processed, 20);

    let counts = manager.stats().await.unwrap();
    assert_eq!(counts.completed, 20);
    assert_eq!(counts.pending, 0);
    assert_eq!(counts.processing, 0);
    assert_eq!(counts.dead, 0);

    // 20 jobs of 100ms across 10 workers: roughly two batches plus
    // claim/poll overhead.
    assert!(elapsed < Duration::from_secs(10), "took {elapsed:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_return_distinct_jobs() {
    let manager = manager().await;
    for i in 0..8 {
        manager.enqueue(request(&format!("c-{i}"), "task")).await.unwrap();
    }

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..16 {
        let manager = Arc::clone(&manager);
        tasks.spawn(async move { manager.claim().await.unwrap().map(|j| j.id) });
    }

    let mut claimed = Vec::new();
    while let Some(result) = tasks.join_next().await {
        if let Some(id) = result.unwrap() {
            claimed.push(id);
        }
    }

    claimed.sort();
    let mut deduped = claimed.clone();
    deduped.dedup();
    assert_eq!(claimed.len(), 8, "every pending job claimed exactly once");
    assert_eq!(claimed, deduped);
}

#[tokio::test]
async fn test_shutdown_interrupts_idle_pool_quickly() {
    let manager = manager().await;
    let runner = Arc::new(MockRunner::always_succeeding());
    let pool = Arc::new(WorkerPool::new(
        Arc::clone(&manager),
        runner,
        fast_settings(),
        Arc::new(SystemTimeProvider),
        3,
    ));
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let pool_task = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.run(shutdown_rx).await })
    };

    // Let the workers settle into the idle poll loop, then interrupt it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(2), pool_task).await;
    assert!(result.is_ok(), "pool must stop well inside the grace period");
    result.unwrap().unwrap().unwrap();
}
