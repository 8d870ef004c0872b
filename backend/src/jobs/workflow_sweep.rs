// Workflow Run Sweep - resumes due pending runs for every tenant

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error};

use super::{JobError, JobResult, SweepJob, SweepReport};
use crate::workflows::WorkflowEngine;

/// Tenants resumed concurrently per tick
const TENANT_CONCURRENCY: usize = 4;

pub struct WorkflowRunSweep {
    engine: Arc<WorkflowEngine>,
}

impl WorkflowRunSweep {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl SweepJob for WorkflowRunSweep {
    fn name(&self) -> &'static str {
        "workflow_run_sweep"
    }

    async fn run(&self, now: DateTime<Utc>) -> JobResult<SweepReport> {
        let tenants = self
            .engine
            .tenants_with_pending_runs()
            .await
            .map_err(|e| JobError::ExecutionError(e.to_string()))?;

        if tenants.is_empty() {
            debug!("No pending workflow runs");
            return Ok(SweepReport::default());
        }

        let results: Vec<_> = stream::iter(tenants)
            .map(|tenant_id| {
                let engine = Arc::clone(&self.engine);
                async move { (tenant_id, engine.process_pending_runs(tenant_id, now).await) }
            })
            .buffer_unordered(TENANT_CONCURRENCY)
            .collect()
            .await;

        let mut report = SweepReport::default();
        for (tenant_id, result) in results {
            match result {
                Ok(resume) => {
                    report.items_processed += resume.resumed();
                    if resume.failed > 0 {
                        report
                            .errors
                            .push(format!("tenant {}: {} runs failed", tenant_id, resume.failed));
                    }
                    if resume.claim_errors > 0 {
                        report.errors.push(format!(
                            "tenant {}: {} runs could not be claimed",
                            tenant_id, resume.claim_errors
                        ));
                    }
                }
                Err(e) => {
                    error!(%tenant_id, error = %e, "Workflow sweep failed for tenant");
                    report.errors.push(format!("tenant {}: {}", tenant_id, e));
                }
            }
        }

        Ok(report)
    }
}
