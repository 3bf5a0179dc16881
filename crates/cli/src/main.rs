//! taskbelt - background job queue CLI

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::{Table, Tabled};
use taskbelt_core::application::{
    shutdown_channel, EnqueueRequest, QueueManager, WorkerPool, WorkerSettings,
};
use taskbelt_core::domain::timestamp::{parse_utc, to_rfc3339};
use taskbelt_core::domain::{Job, JobState, MetricsSummary, StateCounts};
use taskbelt_core::port::time_provider::SystemTimeProvider;
use taskbelt_core::settings::Settings;
use taskbelt_infra_sqlite::{create_pool, run_migrations, SqliteJobStore};
use taskbelt_infra_system::ShellRunner;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const PID_FILE: &str = "~/.taskbelt/workers.pid";

#[derive(Parser)]
#[command(name = "taskbelt")]
#[command(about = "taskbelt - background job queue", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a new job from a JSON object
    ///
    /// Example: taskbelt enqueue '{"id":"job1","command":"sleep 2","priority":8}'
    Enqueue {
        /// JSON with keys id, command, priority, max_retries, run_at
        job_json: String,
    },

    /// List jobs
    List {
        /// Filter by state (pending, processing, completed, failed, dead)
        #[arg(long)]
        state: Option<String>,
    },

    /// Show job counts per state
    Status,

    /// Show event counts, mean duration and recent events
    Metrics {
        /// Number of recent events to show
        #[arg(long, default_value_t = 10)]
        recent: i64,
    },

    /// Worker management
    #[command(subcommand)]
    Worker(WorkerCommands),

    /// Dead letter queue
    #[command(subcommand)]
    Dlq(DlqCommands),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Serve the web dashboard
    Web {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8323)]
        port: u16,
    },
}

#[derive(Subcommand)]
enum WorkerCommands {
    /// Run a worker pool in the foreground until interrupted
    Start {
        /// Number of workers
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Signal a running pool to stop gracefully
    Stop,
    /// Show per-worker liveness and processed-job counts
    Health,
}

#[derive(Subcommand)]
enum DlqCommands {
    /// List dead jobs
    List,
    /// Move a dead job back to pending
    Retry { job_id: String },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print one key, or all keys
    Get { key: Option<String> },
    /// Set a key and persist it
    Set { key: String, value: String },
}

#[derive(Deserialize)]
struct EnqueueJson {
    id: String,
    command: String,
    priority: Option<i64>,
    max_retries: Option<i64>,
    run_at: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = Settings::load();

    match cli.command {
        Commands::Enqueue { job_json } => {
            let data: EnqueueJson =
                serde_json::from_str(&job_json).context("invalid JSON: expected an object with 'id' and 'command'")?;
            let run_at = data
                .run_at
                .as_deref()
                .map(parse_utc)
                .transpose()
                .map_err(|e| anyhow!(e))?;

            let manager = open_manager(&settings).await?;
            let job = manager
                .enqueue(EnqueueRequest {
                    id: data.id,
                    command: data.command,
                    priority: data.priority,
                    max_retries: data.max_retries,
                    run_at,
                })
                .await?;

            match job.run_at {
                Some(at) => println!(
                    "{} job {} (priority={}, scheduled for {})",
                    "Enqueued".green().bold(),
                    job.id,
                    job.priority,
                    to_rfc3339(at)
                ),
                None => println!(
                    "{} job {} (priority={})",
                    "Enqueued".green().bold(),
                    job.id,
                    job.priority
                ),
            }
        }

        Commands::List { state } => {
            let state = parse_state_filter(state.as_deref())?;
            let manager = open_manager(&settings).await?;
            let jobs = manager.list(state).await?;
            print_jobs(&jobs);
        }

        Commands::Status => {
            let manager = open_manager(&settings).await?;
            print_status(&manager.stats().await?);
        }

        Commands::Metrics { recent } => {
            let manager = open_manager(&settings).await?;
            print_metrics(&manager.metrics(recent.max(0)).await?);
        }

        Commands::Worker(cmd) => run_worker_command(cmd, &settings).await?,

        Commands::Dlq(DlqCommands::List) => {
            let manager = open_manager(&settings).await?;
            let jobs = manager.list(Some(JobState::Dead)).await?;
            if jobs.is_empty() {
                println!("DLQ is empty");
            } else {
                println!("{}", format!("=== Dead Letter Queue ({} jobs) ===", jobs.len()).red().bold());
                println!();
                print_jobs(&jobs);
            }
        }

        Commands::Dlq(DlqCommands::Retry { job_id }) => {
            let manager = open_manager(&settings).await?;
            manager.retry_dead(&job_id).await?;
            println!("{} job {} reset to pending", "Requeued".green().bold(), job_id);
        }

        Commands::Config(ConfigCommands::Get { key }) => match key {
            Some(key) => {
                let value = settings.get(&key.replace('-', "_"))?;
                println!("{} = {}", key, value);
            }
            None => {
                for key in Settings::KEYS {
                    println!("{}: {}", key.replace('_', "-"), settings.get(key)?);
                }
            }
        },

        Commands::Config(ConfigCommands::Set { key, value }) => {
            let mut updated = settings.clone();
            updated.set(&key.replace('-', "_"), &value)?;
            updated.save()?;
            println!("Set {} = {}", key, value);
        }

        Commands::Web { host, port } => {
            let addr = format!("{host}:{port}")
                .parse()
                .with_context(|| format!("invalid bind address {host}:{port}"))?;
            let manager = open_manager(&settings).await?;
            println!("Dashboard on http://{host}:{port} (Ctrl+C to stop)");
            taskbelt_api_http::serve(addr, manager).await?;
        }
    }

    Ok(())
}

async fn run_worker_command(cmd: WorkerCommands, settings: &Settings) -> Result<()> {
    match cmd {
        WorkerCommands::Start { count } => {
            let manager = open_manager(settings).await?;
            let time = Arc::new(SystemTimeProvider);
            let runner = Arc::new(ShellRunner::new(time.clone()));
            let pool = WorkerPool::new(
                manager,
                runner,
                WorkerSettings::from_settings(settings),
                time,
                count,
            );

            write_pid_file()?;
            let (shutdown_tx, shutdown_rx) = shutdown_channel();
            tokio::spawn(async move {
                wait_for_signal().await;
                info!("shutdown signal received");
                shutdown_tx.shutdown();
            });

            println!("Starting {count} worker(s)... (Ctrl+C to stop)");
            let result = pool.run(shutdown_rx).await;
            remove_pid_file();
            result?;
        }

        WorkerCommands::Stop => stop_workers()?,

        WorkerCommands::Health => {
            let manager = open_manager(settings).await?;
            let workers = manager.worker_health().await?;
            if workers.is_empty() {
                println!("No worker heartbeats recorded");
                return Ok(());
            }

            let now = manager.now_millis();
            println!("{}", "=== Worker Health ===".cyan().bold());
            for worker in workers {
                let status = if worker.alive(now) {
                    "alive".green().bold()
                } else {
                    "dead".red().bold()
                };
                let age_secs = (now - worker.last_heartbeat).max(0) / 1000;
                println!(
                    "worker {}: {} (pid {}, last heartbeat {}s ago, {} jobs processed)",
                    worker.worker_id, status, worker.pid, age_secs, worker.jobs_processed
                );
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn stop_workers() -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let path = pid_file_path();
    if !path.exists() {
        println!("No workers running");
        return Ok(());
    }

    let contents = std::fs::read_to_string(&path)?;
    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        let pid: i32 = line.trim().parse().context("corrupt pid file")?;
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => println!("Sent SIGTERM to worker pool {pid}"),
            Err(nix::errno::Errno::ESRCH) => println!("Worker pool {pid} not found"),
            Err(e) => println!("Could not signal {pid}: {e}"),
        }
    }

    std::fs::remove_file(&path).ok();
    Ok(())
}

#[cfg(not(unix))]
fn stop_workers() -> Result<()> {
    anyhow::bail!("worker stop is only supported on unix")
}

fn pid_file_path() -> PathBuf {
    shellexpand::tilde(PID_FILE).into_owned().into()
}

fn write_pid_file() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, format!("{}\n", std::process::id()))?;
    Ok(())
}

fn remove_pid_file() {
    std::fs::remove_file(pid_file_path()).ok();
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn open_manager(settings: &Settings) -> Result<Arc<QueueManager>> {
    if let Some(parent) = std::path::Path::new(&settings.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let pool = create_pool(&settings.db_path).await?;
    run_migrations(&pool).await?;

    let time = Arc::new(SystemTimeProvider);
    let store = Arc::new(SqliteJobStore::new(pool, time.clone()));
    Ok(Arc::new(QueueManager::new(store, time, settings.max_retries)))
}

fn parse_state_filter(state: Option<&str>) -> Result<Option<JobState>> {
    state
        .map(|s| s.parse::<JobState>())
        .transpose()
        .map_err(|e| anyhow!(e))
}

#[derive(Tabled)]
struct JobRowView {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "PRIORITY")]
    priority: i64,
    #[tabled(rename = "ATTEMPTS")]
    attempts: String,
    #[tabled(rename = "COMMAND")]
    command: String,
    #[tabled(rename = "ERROR")]
    error: String,
}

fn print_jobs(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs found");
        return;
    }

    let rows: Vec<JobRowView> = jobs
        .iter()
        .map(|job| JobRowView {
            id: job.id.clone(),
            state: job.state.to_string(),
            priority: job.priority,
            attempts: format!("{}/{}", job.attempts, job.max_retries),
            command: truncate(&job.command, 40),
            error: job
                .error_message
                .as_deref()
                .map(|e| truncate(e, 40))
                .unwrap_or_default(),
        })
        .collect();

    println!("{}", Table::new(rows));
}

fn print_status(counts: &StateCounts) {
    println!("{}", "=== Queue Status ===".cyan().bold());
    println!("Pending:    {}", counts.pending);
    println!("Processing: {}", counts.processing.to_string().yellow());
    println!("Completed:  {}", counts.completed.to_string().green());
    println!("Failed:     {}", counts.failed);
    println!("Dead (DLQ): {}", counts.dead.to_string().red());
}

fn print_metrics(summary: &MetricsSummary) {
    println!("{}", "=== Job Metrics ===".cyan().bold());
    println!();
    println!("Event counts:");
    println!("  {:<12} {}", "enqueued", summary.counts.enqueued);
    println!("  {:<12} {}", "started", summary.counts.started);
    println!("  {:<12} {}", "completed", summary.counts.completed);
    println!("  {:<12} {}", "failed", summary.counts.failed);
    println!("  {:<12} {}", "dlq", summary.counts.dlq);

    match summary.avg_duration_ms {
        Some(avg) => println!("\nAverage execution time: {avg:.0}ms"),
        None => println!("\nAverage execution time: n/a"),
    }

    if !summary.recent.is_empty() {
        println!("\nRecent events (last {}):", summary.recent.len());
        for event in &summary.recent {
            println!(
                "  [{}] {:<20} {}",
                to_rfc3339(event.timestamp),
                truncate(&event.job_id, 20),
                event.event_type
            );
            if let Some(error) = &event.error_message {
                println!("      error: {}", truncate(error, 60));
            }
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

fn init_tracing() {
    let log_format = std::env::var("TASKBELT_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("taskbelt=info"))
        .expect("failed to create env filter");

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
}
