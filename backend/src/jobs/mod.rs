// Background Jobs
//
// Recurring sweeps owned by the process. Each sweep is registered with the
// tokio-cron-scheduler backed JobScheduler and runs at a fixed interval.

pub mod scheduler;
pub mod webhook_retry_sweep;
pub mod workflow_sweep;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use scheduler::{JobError, JobExecutionLog, JobResult, JobScheduler, JobStatus};
pub use webhook_retry_sweep::WebhookRetrySweep;
pub use workflow_sweep::WorkflowRunSweep;

/// Summary of one sweep tick
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub items_processed: usize,
    pub errors: Vec<String>,
}

#[async_trait]
pub trait SweepJob: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, now: DateTime<Utc>) -> JobResult<SweepReport>;
}
