// Workflow Engine - run coordinator and pending-run resumer

use chrono::{DateTime, Duration, Utc};
use inspectos_shared::{
    RunCheckpoint, RunStatus, TriggerScope, WorkflowDefinition, WorkflowRun,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::conditions;
use super::executor::{ActionExecutor, RunContext};
use super::store::{EntityStore, WorkflowStore};
use super::{EngineError, EngineResult};
use crate::config::AutomationConfig;
use crate::webhooks::WebhookDispatcher;

/// The entity a workflow fires for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTarget {
    pub tenant_id: Uuid,
    pub scope: TriggerScope,
    pub entity_id: Uuid,
}

/// Outcome of one resume sweep for a tenant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResumeReport {
    pub examined: usize,
    pub not_due: usize,
    pub inactive: usize,
    pub contended: usize,
    pub completed: usize,
    pub suspended: usize,
    pub failed: usize,
    /// Runs skipped because the claim itself hit a storage error
    pub claim_errors: usize,
}

impl ResumeReport {
    pub fn resumed(&self) -> usize {
        self.completed + self.suspended + self.failed
    }
}

pub struct WorkflowEngine {
    workflows: Arc<dyn WorkflowStore>,
    entities: Arc<dyn EntityStore>,
    executor: ActionExecutor,
    retry_delay: Duration,
    max_failures: u32,
}

impl WorkflowEngine {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        entities: Arc<dyn EntityStore>,
        webhooks: Option<Arc<WebhookDispatcher>>,
        config: &AutomationConfig,
    ) -> Self {
        Self {
            executor: ActionExecutor::new(entities.clone(), webhooks),
            workflows,
            entities,
            retry_delay: config.action_retry_delay,
            max_failures: config.max_action_failures.max(1),
        }
    }

    pub(crate) fn workflow_store(&self) -> &dyn WorkflowStore {
        self.workflows.as_ref()
    }

    pub(crate) fn entity_store(&self) -> &dyn EntityStore {
        self.entities.as_ref()
    }

    /// Evaluate a definition against the target and, if it passes, create a
    /// run. A positive delay only schedules the run; otherwise the pipeline
    /// executes immediately. Returns the created run id.
    ///
    /// `assigned_tags` is the entity's full tag set when the caller already
    /// has it; otherwise it is fetched on demand.
    pub async fn run_workflow(
        &self,
        workflow: &WorkflowDefinition,
        target: RunTarget,
        status: Option<&str>,
        assigned_tags: Option<&HashSet<Uuid>>,
    ) -> EngineResult<Option<Uuid>> {
        let passes = conditions::should_run(&workflow.conditions, status, || async move {
            match assigned_tags {
                Some(tags) => Ok(tags.clone()),
                None => {
                    self.entities
                        .assigned_tags(target.tenant_id, target.scope, target.entity_id)
                        .await
                }
            }
        })
        .await?;

        if !passes {
            debug!(workflow_id = %workflow.id, entity_id = %target.entity_id, "Workflow conditions not met");
            return Ok(None);
        }

        let now = Utc::now();
        let delayed = workflow.delay_minutes > 0;
        let run = WorkflowRun {
            id: Uuid::new_v4(),
            tenant_id: target.tenant_id,
            workflow_id: workflow.id,
            scope: target.scope,
            entity_id: target.entity_id,
            status: if delayed { RunStatus::Pending } else { RunStatus::Running },
            result: if delayed {
                RunCheckpoint::scheduled(now + Duration::minutes(i64::from(workflow.delay_minutes)))
            } else {
                RunCheckpoint::default()
            },
            created_at: now,
            completed_at: None,
        };

        self.workflows.insert_run(&run).await?;

        if delayed {
            info!(
                tenant_id = %run.tenant_id,
                workflow_id = %workflow.id,
                run_id = %run.id,
                delay_minutes = workflow.delay_minutes,
                "Workflow run scheduled"
            );
            return Ok(Some(run.id));
        }

        info!(tenant_id = %run.tenant_id, workflow_id = %workflow.id, run_id = %run.id, "Workflow run started");
        let checkpoint = run.result.clone();
        self.execute_from_index(workflow, &run, checkpoint, now).await?;

        Ok(Some(run.id))
    }

    /// Drive the pipeline from `checkpoint.next_index`, persisting on a wait
    /// (pending) or at the end (completed).
    pub async fn execute_from_index(
        &self,
        workflow: &WorkflowDefinition,
        run: &WorkflowRun,
        mut checkpoint: RunCheckpoint,
        now: DateTime<Utc>,
    ) -> EngineResult<RunStatus> {
        let ctx = RunContext::from(run);
        let start = checkpoint.next_index;
        checkpoint.actions.truncate(start);

        for (index, action) in workflow.actions.iter().enumerate().skip(start) {
            let outcome = match self.executor.execute(&ctx, action).await {
                Ok(outcome) => outcome,
                Err(source) => {
                    self.reschedule_after_failure(run, checkpoint, &source, now).await;
                    return Err(EngineError::Action {
                        index,
                        kind: action.kind().to_string(),
                        source,
                    });
                }
            };

            let wait = outcome.wait_minutes();
            checkpoint.record(index, outcome);

            if let Some(minutes) = wait {
                let resume_at = now + Duration::minutes(i64::from(minutes));
                checkpoint.scheduled_for = Some(resume_at);
                self.workflows
                    .save_checkpoint(run.id, RunStatus::Pending, &checkpoint, None)
                    .await?;
                info!(
                    run_id = %run.id,
                    next_index = checkpoint.next_index,
                    resume_at = %resume_at,
                    "Workflow run suspended"
                );
                return Ok(RunStatus::Pending);
            }
        }

        checkpoint.scheduled_for = None;
        self.workflows
            .save_checkpoint(run.id, RunStatus::Completed, &checkpoint, Some(now))
            .await?;
        info!(run_id = %run.id, actions = checkpoint.actions.len(), "Workflow run completed");

        Ok(RunStatus::Completed)
    }

    /// Best-effort write of progress so far back to `pending` so the sweep
    /// re-drives the failed action. Parks the run once the failure budget is spent.
    async fn reschedule_after_failure(
        &self,
        run: &WorkflowRun,
        mut checkpoint: RunCheckpoint,
        cause: &crate::database::StoreError,
        now: DateTime<Utc>,
    ) {
        checkpoint.failures += 1;
        checkpoint.last_error = Some(cause.to_string());

        if checkpoint.failures >= self.max_failures {
            checkpoint.scheduled_for = None;
            error!(
                run_id = %run.id,
                failures = checkpoint.failures,
                error = %cause,
                "Workflow run parked after repeated action failures"
            );
        } else {
            checkpoint.scheduled_for = Some(now + self.retry_delay);
            warn!(
                run_id = %run.id,
                failures = checkpoint.failures,
                error = %cause,
                "Workflow action failed, run rescheduled"
            );
        }

        if let Err(e) = self
            .workflows
            .save_checkpoint(run.id, RunStatus::Pending, &checkpoint, None)
            .await
        {
            error!(run_id = %run.id, error = %e, "Failed to persist checkpoint after action failure");
        }
    }

    /// Resume every pending run of a tenant whose scheduled time has passed.
    ///
    /// Each run is claimed with a conditional pending -> running update
    /// first, so concurrent sweeps never execute the same run twice. A run
    /// that fails is logged and counted; the sweep moves on.
    pub async fn process_pending_runs(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> EngineResult<ResumeReport> {
        let pending = self.workflows.pending_runs(tenant_id).await?;
        let mut report = ResumeReport {
            examined: pending.len(),
            ..ResumeReport::default()
        };

        let due: Vec<WorkflowRun> = pending
            .into_iter()
            .filter(|run| run.result.is_due(now))
            .collect();
        report.not_due = report.examined - due.len();

        if due.is_empty() {
            return Ok(report);
        }

        let mut workflow_ids: Vec<Uuid> = due.iter().map(|r| r.workflow_id).collect();
        workflow_ids.sort_unstable();
        workflow_ids.dedup();

        let definitions: HashMap<Uuid, WorkflowDefinition> = self
            .workflows
            .workflows_by_ids(tenant_id, &workflow_ids)
            .await?
            .into_iter()
            .map(|w| (w.id, w))
            .collect();

        for run in due {
            let Some(workflow) = definitions.get(&run.workflow_id).filter(|w| w.is_active) else {
                debug!(run_id = %run.id, workflow_id = %run.workflow_id, "Skipping run of inactive workflow");
                report.inactive += 1;
                continue;
            };

            match self.workflows.claim_run(tenant_id, run.id).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(run_id = %run.id, "Run already claimed by another sweep");
                    report.contended += 1;
                    continue;
                }
                Err(e) => {
                    error!(tenant_id = %tenant_id, run_id = %run.id, error = %e, "Failed to claim workflow run");
                    report.claim_errors += 1;
                    continue;
                }
            }

            let checkpoint = run.result.clone();
            match self.execute_from_index(workflow, &run, checkpoint, now).await {
                Ok(RunStatus::Completed) => report.completed += 1,
                Ok(_) => report.suspended += 1,
                Err(e) => {
                    error!(tenant_id = %tenant_id, run_id = %run.id, error = %e, "Resumed workflow run failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            tenant_id = %tenant_id,
            resumed = report.resumed(),
            not_due = report.not_due,
            inactive = report.inactive,
            claim_errors = report.claim_errors,
            "Pending workflow runs processed"
        );

        Ok(report)
    }

    pub async fn tenants_with_pending_runs(&self) -> EngineResult<Vec<Uuid>> {
        Ok(self.workflows.tenants_with_pending_runs().await?)
    }
}
