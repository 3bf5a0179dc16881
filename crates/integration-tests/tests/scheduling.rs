// Scheduled-job eligibility scenarios.

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use taskbelt_core::application::{shutdown_channel, WorkerPool};
use taskbelt_core::domain::JobState;
use taskbelt_core::port::command_runner::mocks::MockRunner;
use taskbelt_core::port::time_provider::SystemTimeProvider;

#[tokio::test]
async fn test_scheduled_job_waits_for_its_time() {
    let manager = manager().await;
    let scheduled_for = manager.now_millis() + 2_000;

    let mut scheduled = request("scheduled", "task scheduled");
    scheduled.run_at = Some(scheduled_for);
    manager.enqueue(scheduled).await.unwrap();
    manager.enqueue(request("immediate", "task immediate")).await.unwrap();

    let runner = Arc::new(MockRunner::always_succeeding());
    let pool = Arc::new(WorkerPool::new(
        Arc::clone(&manager),
        runner.clone(),
        fast_settings(),
        Arc::new(SystemTimeProvider),
        1,
    ));
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let pool_task = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.run(shutdown_rx).await })
    };

    // The immediate job completes while the scheduled one is still waiting.
    assert!(wait_for_counts(&manager, Duration::from_millis(1_200), |c| c.completed == 1).await);
    assert_eq!(
        manager.job("scheduled").await.unwrap().state,
        JobState::Pending,
        "scheduled job must not start early"
    );

    assert!(wait_for_counts(&manager, Duration::from_secs(5), |c| c.completed == 2).await);
    shutdown_tx.shutdown();
    pool_task.await.unwrap().unwrap();

    assert_eq!(runner.commands(), ["task immediate", "task scheduled"]);

    // It started no earlier than its schedule.
    let job = manager.job("scheduled").await.unwrap();
    assert!(job.last_executed_at.unwrap() >= scheduled_for);
}

#[tokio::test]
async fn test_unclaimed_scheduled_job_stays_pending() {
    let manager = manager().await;
    let mut req = request("future", "task future");
    req.run_at = Some(manager.now_millis() + 60_000);
    manager.enqueue(req).await.unwrap();

    assert!(manager.claim().await.unwrap().is_none());
    assert_eq!(manager.job("future").await.unwrap().state, JobState::Pending);
}

#[tokio::test]
async fn test_past_run_at_is_immediately_eligible() {
    let manager = manager().await;
    let mut req = request("overdue", "task overdue");
    req.run_at = Some(manager.now_millis() - 1_000);
    manager.enqueue(req).await.unwrap();

    let claimed = manager.claim().await.unwrap().unwrap();
    assert_eq!(claimed.id, "overdue");
}
