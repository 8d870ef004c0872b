// Job Scheduler - runs every registered sweep at its own interval

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{SweepJob, SweepReport};

const MAX_EXECUTION_LOGS: usize = 100;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Job execution error: {0}")]
    ExecutionError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("{0} is already running")]
    AlreadyRunning(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub items_processed: usize,
    pub errors: Vec<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Completed,
    Failed,
    PartialFailure,
}

type ExecutionLogs = Arc<RwLock<Vec<JobExecutionLog>>>;

struct RegisteredJob {
    job: Arc<dyn SweepJob>,
    running: Arc<AtomicBool>,
}

pub struct JobScheduler {
    scheduler: TokioScheduler,
    jobs: HashMap<&'static str, RegisteredJob>,
    execution_logs: ExecutionLogs,
}

impl JobScheduler {
    pub async fn new() -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            jobs: HashMap::new(),
            execution_logs: Arc::new(RwLock::new(Vec::new())),
        })
    }

    /// Register a sweep to run every `every`. Ticks that fire while the
    /// previous run of the same job is still going are skipped.
    pub async fn register(&mut self, job: Arc<dyn SweepJob>, every: Duration) -> JobResult<()> {
        let name = job.name();
        if every.is_zero() {
            return Err(JobError::ConfigError(format!("{} interval must be positive", name)));
        }
        if self.jobs.contains_key(name) {
            return Err(JobError::ConfigError(format!("{} is already registered", name)));
        }

        let running = Arc::new(AtomicBool::new(false));
        let logs = self.execution_logs.clone();
        let scheduled_job = job.clone();
        let guard = running.clone();

        let cron_job = Job::new_repeated_async(every, move |_uuid, _lock| {
            let job = scheduled_job.clone();
            let logs = logs.clone();
            let guard = guard.clone();

            Box::pin(async move {
                if guard.swap(true, Ordering::AcqRel) {
                    debug!(job = job.name(), "Previous run still in progress, skipping tick");
                    return;
                }
                if let Err(e) = execute_and_log(job.as_ref(), &logs).await {
                    error!(job = job.name(), error = %e, "Scheduled job failed");
                }
                guard.store(false, Ordering::Release);
            })
        })?;

        self.scheduler.add(cron_job).await?;
        self.jobs.insert(name, RegisteredJob { job, running });
        info!(job = name, interval_secs = every.as_secs_f64(), "Scheduled background job");

        Ok(())
    }

    pub async fn start(&self) -> JobResult<()> {
        info!(jobs = self.jobs.len(), "Starting background job scheduler");
        self.scheduler.start().await?;
        Ok(())
    }

    pub async fn shutdown(&self) -> JobResult<()> {
        info!("Shutting down background job scheduler");
        let mut scheduler = self.scheduler.clone();
        scheduler.shutdown().await?;
        Ok(())
    }

    pub async fn get_execution_logs(&self) -> Vec<JobExecutionLog> {
        self.execution_logs.read().await.clone()
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.jobs.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Run a registered job immediately, outside its schedule
    pub async fn run_job_now(&self, job_name: &str) -> JobResult<SweepReport> {
        let registered = self
            .jobs
            .get(job_name)
            .ok_or_else(|| JobError::ConfigError(format!("Unknown job: {}", job_name)))?;

        if registered.running.swap(true, Ordering::AcqRel) {
            return Err(JobError::AlreadyRunning(job_name.to_string()));
        }
        let result = execute_and_log(registered.job.as_ref(), &self.execution_logs).await;
        registered.running.store(false, Ordering::Release);

        result
    }
}

async fn execute_and_log(job: &dyn SweepJob, logs: &ExecutionLogs) -> JobResult<SweepReport> {
    let started_at = Utc::now();
    let result = job.run(started_at).await;
    let completed_at = Utc::now();

    let (status, items_processed, errors) = match &result {
        Ok(report) if report.errors.is_empty() => (JobStatus::Completed, report.items_processed, Vec::new()),
        Ok(report) => {
            warn!(job = job.name(), errors = report.errors.len(), "Job completed with errors");
            (JobStatus::PartialFailure, report.items_processed, report.errors.clone())
        }
        Err(e) => (JobStatus::Failed, 0, vec![e.to_string()]),
    };

    // Idle ticks are not worth a log slot
    if status == JobStatus::Completed && items_processed == 0 {
        return result;
    }
    info!(job = job.name(), items_processed, "Job completed");

    push_log(
        logs,
        JobExecutionLog {
            id: Uuid::new_v4(),
            job_name: job.name().to_string(),
            started_at,
            completed_at: Some(completed_at),
            status,
            items_processed,
            errors,
            duration_ms: Some((completed_at - started_at).num_milliseconds()),
        },
    )
    .await;

    result
}

async fn push_log(logs: &ExecutionLogs, log: JobExecutionLog) {
    let mut logs = logs.write().await;
    logs.push(log);
    // Keep only the most recent entries
    if logs.len() > MAX_EXECUTION_LOGS {
        let excess = logs.len() - MAX_EXECUTION_LOGS;
        logs.drain(..excess);
    }
}
