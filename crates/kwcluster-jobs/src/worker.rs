//! Background worker that claims pending jobs and runs their pipelines.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use kwcluster_core::{defaults, Job, Result};

use crate::pipeline::PipelineOrchestrator;

/// Error message recorded on jobs reaped after running too long.
pub const ABANDONED_MESSAGE: &str = "abandoned";

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrently running pipelines.
    pub max_concurrent_jobs: usize,
    /// Whether to enable job processing.
    pub enabled: bool,
    /// Hard limit on one pipeline run.
    pub job_timeout: Duration,
    /// A `running` job older than this is reaped.
    pub stale_after: Duration,
    pub reap_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            enabled: true,
            job_timeout: Duration::from_secs(defaults::JOB_TIMEOUT_SECS),
            stale_after: Duration::from_secs(defaults::JOB_STALE_AFTER_SECS),
            reap_interval: Duration::from_secs(defaults::JOB_REAP_INTERVAL_SECS),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_MAX_CONCURRENT` | `2` | Max concurrent pipelines |
    /// | `JOB_POLL_INTERVAL_MS` | `1000` | Polling interval when idle |
    /// | `JOB_TIMEOUT_SECS` | `14400` | Per-job time limit |
    /// | `JOB_STALE_AFTER_SECS` | `21600` | Age at which a running job is reaped |
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        if let Some(n) = env_parse::<usize>("JOB_MAX_CONCURRENT") {
            config.max_concurrent_jobs = n.max(1);
        }
        if let Some(ms) = env_parse("JOB_POLL_INTERVAL_MS") {
            config.poll_interval_ms = ms;
        }
        if let Some(secs) = env_parse("JOB_TIMEOUT_SECS") {
            config.job_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("JOB_STALE_AFTER_SECS") {
            config.stale_after = Duration::from_secs(secs);
        }
        config
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration, reap_interval: Duration) -> Self {
        self.stale_after = stale_after;
        self.reap_interval = reap_interval;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Event emitted by the job worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    JobStarted { job_id: Uuid },
    JobCompleted { job_id: Uuid, duration_ms: u64 },
    JobFailed { job_id: Uuid, error: String },
    /// A stale running job was failed and its records removed.
    JobReaped { job_id: Uuid },
    WorkerStarted,
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to stop. In-flight pipelines are aborted; their jobs
    /// stay `running` until reaped.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| kwcluster_core::Error::Internal("Failed to send shutdown signal".into()))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Claims pending jobs and runs up to `max_concurrent_jobs` pipelines at once.
pub struct JobWorker {
    pipeline: Arc<PipelineOrchestrator>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    pub fn new(pipeline: Arc<PipelineOrchestrator>, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            pipeline,
            config,
            event_tx,
        }
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            job_timeout_secs = self.config.job_timeout.as_secs(),
            "Job worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut tasks = JoinSet::new();
        let mut last_reap: Option<Instant> = None;

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Job worker received shutdown signal");
                break;
            }

            if last_reap.map_or(true, |t| t.elapsed() >= self.config.reap_interval) {
                self.reap_stale().await;
                last_reap = Some(Instant::now());
            }

            while tasks.len() < self.config.max_concurrent_jobs {
                let Some(job) = self.claim_job().await else {
                    break;
                };
                let pipeline = self.pipeline.clone();
                let event_tx = self.event_tx.clone();
                let timeout = self.config.job_timeout;
                tasks.spawn(execute_job(pipeline, event_tx, timeout, job));
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Job worker received shutdown signal");
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = ?e, "Job task panicked");
                    }
                }
                _ = sleep(poll_interval) => {}
            }
        }

        if !tasks.is_empty() {
            warn!(in_flight = tasks.len(), "Aborting in-flight jobs");
            tasks.shutdown().await;
        }
        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }

    async fn claim_job(&self) -> Option<Job> {
        match self.pipeline.jobs().claim_next().await {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "Failed to claim job");
                None
            }
        }
    }

    /// Fail jobs stuck in `running` past `stale_after` and drop their records.
    async fn reap_stale(&self) {
        let age = chrono::Duration::from_std(self.config.stale_after)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        let cutoff = chrono::Utc::now() - age;

        let stale = match self.pipeline.jobs().list_stale_running(cutoff).await {
            Ok(stale) => stale,
            Err(e) => {
                error!(error = %e, "Failed to list stale jobs");
                return;
            }
        };
        for job in stale {
            match self.pipeline.abandon(&job, ABANDONED_MESSAGE).await {
                Ok(true) => {
                    let _ = self
                        .event_tx
                        .send(WorkerEvent::JobReaped { job_id: job.id });
                }
                Ok(false) => debug!(job_id = %job.id, "Stale job already finished"),
                Err(e) => error!(job_id = %job.id, error = %e, "Failed to reap stale job"),
            }
        }
    }
}

/// Run one claimed job under the time limit.
async fn execute_job(
    pipeline: Arc<PipelineOrchestrator>,
    event_tx: broadcast::Sender<WorkerEvent>,
    timeout: Duration,
    job: Job,
) {
    let start = Instant::now();
    let job_id = job.id;
    info!(%job_id, owner = %job.owner, "Processing job");
    let _ = event_tx.send(WorkerEvent::JobStarted { job_id });

    let run = AssertUnwindSafe(pipeline.run_claimed(job.clone())).catch_unwind();
    let event = match tokio::time::timeout(timeout, run).await {
        Ok(Ok(Ok(_))) => WorkerEvent::JobCompleted {
            job_id,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        Ok(Ok(Err(e))) => WorkerEvent::JobFailed {
            job_id,
            error: e.to_string(),
        },
        Ok(Err(payload)) => {
            let reason = format!("Job panicked: {}", panic_message(&*payload));
            error!(%job_id, "{}", reason);
            if let Err(e) = pipeline.abandon(&job, &reason).await {
                error!(%job_id, error = %e, "Failed to record job panic");
            }
            WorkerEvent::JobFailed {
                job_id,
                error: reason,
            }
        }
        Err(_) => {
            let reason = format!("Job exceeded timeout of {}s", timeout.as_secs());
            warn!(%job_id, "{}", reason);
            if let Err(e) = pipeline.abandon(&job, &reason).await {
                error!(%job_id, error = %e, "Failed to record job timeout");
            }
            WorkerEvent::JobFailed {
                job_id,
                error: reason,
            }
        }
    };
    let _ = event_tx.send(event);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
