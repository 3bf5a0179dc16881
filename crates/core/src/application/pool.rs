// Worker pool supervisor with health monitoring.

use crate::application::worker::constants::SHUTDOWN_GRACE_PERIOD;
use crate::application::worker::{ShutdownToken, Worker, WorkerSettings};
use crate::application::queue::QueueManager;
use crate::domain::WorkerHealth;
use crate::error::Result;
use crate::port::{CommandRunner, TimeProvider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Shared health map: single writer per worker, any number of readers.
/// Coarse locking is fine at heartbeat frequency.
#[derive(Clone, Default)]
pub struct HealthRegistry {
    inner: Arc<Mutex<HashMap<usize, WorkerHealth>>>,
}

impl HealthRegistry {
    pub fn publish(&self, health: WorkerHealth) {
        self.inner
            .lock()
            .expect("health registry poisoned")
            .insert(health.worker_id as usize, health);
    }

    pub fn snapshot(&self) -> Vec<WorkerHealth> {
        let mut all: Vec<WorkerHealth> = self
            .inner
            .lock()
            .expect("health registry poisoned")
            .values()
            .copied()
            .collect();
        all.sort_by_key(|h| h.worker_id);
        all
    }
}

/// Spawns N workers and supervises their shutdown.
pub struct WorkerPool {
    manager: Arc<QueueManager>,
    runner: Arc<dyn CommandRunner>,
    settings: WorkerSettings,
    time: Arc<dyn TimeProvider>,
    count: usize,
    registry: HealthRegistry,
}

impl WorkerPool {
    pub fn new(
        manager: Arc<QueueManager>,
        runner: Arc<dyn CommandRunner>,
        settings: WorkerSettings,
        time: Arc<dyn TimeProvider>,
        count: usize,
    ) -> Self {
        Self {
            manager,
            runner,
            settings,
            time,
            count,
            registry: HealthRegistry::default(),
        }
    }

    /// Liveness snapshot of this pool's workers.
    pub fn health(&self) -> Vec<WorkerHealth> {
        self.registry.snapshot()
    }

    /// Run the pool until `shutdown` fires, then wait up to the grace
    /// period for workers to return voluntarily before aborting the
    /// rest. A worker mid-execute finishes its subprocess (bounded by
    /// the job timeout); aborted tasks only ever die between jobs or
    /// inside an interruptible sleep.
    pub async fn run(&self, shutdown: ShutdownToken) -> Result<()> {
        // Heartbeats from a previous pool are meaningless now.
        self.manager.clear_worker_health().await?;

        info!(count = self.count, "starting worker pool");
        let mut tasks = JoinSet::new();
        for id in 0..self.count {
            let worker = Worker::new(
                id,
                Arc::clone(&self.manager),
                Arc::clone(&self.runner),
                self.settings,
                Arc::clone(&self.time),
                self.registry.clone(),
            );
            let token = shutdown.clone();
            tasks.spawn(async move { worker.run(token).await });
        }

        let mut token = shutdown.clone();
        token.wait().await;

        info!(
            grace_secs = SHUTDOWN_GRACE_PERIOD.as_secs(),
            "shutdown requested, waiting for workers"
        );
        let drained = tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "worker exited with error"),
                    Err(e) => warn!(error = %e, "worker task failed"),
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("grace period elapsed, force-terminating remaining workers");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        info!("worker pool stopped");
        Ok(())
    }
}
