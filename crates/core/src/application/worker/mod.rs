// Worker - claim/execute/transition loop

pub mod constants;
mod shutdown;

pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::pool::HealthRegistry;
use crate::application::queue::QueueManager;
use crate::domain::WorkerHealth;
use crate::error::{QueueError, Result};
use crate::port::{CommandRunner, TimeProvider};
use crate::settings::Settings;
use constants::*;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// The slice of [`Settings`] a worker snapshots at startup. Runtime
/// config changes do not reach running workers.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    pub backoff_base: f64,
}

impl WorkerSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            poll_interval: Duration::from_secs_f64(settings.worker_poll_interval),
            job_timeout: Duration::from_secs(settings.job_timeout),
            backoff_base: settings.backoff_base,
        }
    }
}

/// One worker: a single control flow driving one job at a time.
pub struct Worker {
    id: usize,
    manager: Arc<QueueManager>,
    runner: Arc<dyn CommandRunner>,
    settings: WorkerSettings,
    time: Arc<dyn TimeProvider>,
    registry: HealthRegistry,
    jobs_processed: AtomicI64,
    pid: i64,
}

impl Worker {
    pub fn new(
        id: usize,
        manager: Arc<QueueManager>,
        runner: Arc<dyn CommandRunner>,
        settings: WorkerSettings,
        time: Arc<dyn TimeProvider>,
        registry: HealthRegistry,
    ) -> Self {
        Self {
            id,
            manager,
            runner,
            settings,
            time,
            registry,
            jobs_processed: AtomicI64::new(0),
            pid: std::process::id() as i64,
        }
    }

    /// Run until shutdown is requested.
    ///
    /// Claim and storage errors are logged and the poll loop continues.
    /// The only fatal condition is a transition that cannot be recorded
    /// even after retries: then the worker exits with the error so a
    /// supervisor can restart it rather than silently drop a claimed job.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(worker = self.id, "worker started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            self.beat().await;
            match self.manager.claim().await {
                Ok(Some(job)) => {
                    if let Err(e) = self.process(job, &mut shutdown).await {
                        error!(
                            worker = self.id,
                            error = %e,
                            "could not record job transition, worker exiting"
                        );
                        return Err(e);
                    }
                }
                Ok(None) => {
                    shutdown.sleep_interruptible(self.settings.poll_interval).await;
                }
                Err(e) => {
                    warn!(worker = self.id, error = %e, "claim failed, continuing to poll");
                    shutdown.sleep_interruptible(ERROR_RECOVERY_SLEEP).await;
                }
            }
        }
        // final heartbeat so the published jobs_processed count is current
        self.beat().await;
        info!(worker = self.id, "worker stopped");
        Ok(())
    }

    /// Execute one claimed job and persist its transition.
    async fn process(
        &self,
        mut job: crate::domain::Job,
        shutdown: &mut ShutdownToken,
    ) -> Result<()> {
        info!(worker = self.id, job_id = %job.id, command = %job.command, "processing job");
        self.beat().await;

        let outcome = self.runner.run(&job.command, self.settings.job_timeout).await;

        if outcome.success {
            self.record(|| self.manager.mark_completed(&job.id, outcome.duration_ms))
                .await?;
            self.jobs_processed.fetch_add(1, Ordering::SeqCst);
            info!(
                worker = self.id,
                job_id = %job.id,
                duration_ms = outcome.duration_ms,
                "job completed"
            );
            return Ok(());
        }

        job.attempts += 1;
        warn!(
            worker = self.id,
            job_id = %job.id,
            error = %outcome.error,
            attempt = job.attempts,
            max_retries = job.max_retries,
            "job failed"
        );

        if job.should_retry() {
            let delay = job.backoff_delay(self.settings.backoff_base);
            info!(worker = self.id, job_id = %job.id, delay_secs = delay.as_secs_f64(), "backing off before retry");
            // An interrupted backoff still records the retry: the claimed
            // job must land back in pending before the worker exits.
            shutdown.sleep_interruptible(delay).await;
            self.record(|| {
                self.manager
                    .mark_pending(&job.id, job.attempts, &outcome.error, Some(outcome.duration_ms))
            })
            .await?;
        } else {
            error!(
                worker = self.id,
                job_id = %job.id,
                attempts = job.attempts,
                "job moved to dead letter queue"
            );
            self.record(|| {
                self.manager
                    .mark_dead(&job.id, job.attempts, &outcome.error, Some(outcome.duration_ms))
            })
            .await?;
        }
        Ok(())
    }

    /// Persist a transition with bounded retries on storage failure.
    ///
    /// A definitive `NotFound`/`InvalidTransition` answer means the job is
    /// no longer ours (an operator intervened); that is logged and
    /// swallowed, not retried.
    async fn record<F, Fut>(&self, op: F) -> Result<()>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut delay = TRANSITION_RETRY_BASE;
        let mut last_err = None;
        for attempt in 1..=TRANSITION_RETRY_ATTEMPTS {
            match op().await {
                Ok(()) => return Ok(()),
                Err(e @ QueueError::Storage(_)) => {
                    warn!(
                        worker = self.id,
                        error = %e,
                        attempt,
                        "recording transition failed, retrying"
                    );
                    last_err = Some(e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    warn!(worker = self.id, error = %e, "transition rejected, job no longer ours");
                    return Ok(());
                }
            }
        }
        Err(last_err.expect("retry loop ran at least once"))
    }

    /// Publish liveness to the in-memory registry and the durable store.
    async fn beat(&self) {
        let health = WorkerHealth {
            worker_id: self.id as i64,
            pid: self.pid,
            last_heartbeat: self.time.now_millis(),
            jobs_processed: self.jobs_processed.load(Ordering::SeqCst),
        };
        self.registry.publish(health);
        if let Err(e) = self.manager.record_heartbeat(&health).await {
            warn!(worker = self.id, error = %e, "heartbeat write failed");
        }
    }
}
