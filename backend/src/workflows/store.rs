// Storage seams for the workflow engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use inspectos_shared::{
    Lead, NewClient, RunCheckpoint, RunStatus, TriggerScope, TriggerType, WorkflowDefinition,
    WorkflowRun,
};
use std::collections::HashSet;
use uuid::Uuid;

use crate::database::StoreResult;

/// Workflow definitions (read-only here) and the runs the engine produces.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Active definitions for a (tenant, scope, trigger type) triple
    async fn active_workflows(
        &self,
        tenant_id: Uuid,
        scope: TriggerScope,
        trigger_type: TriggerType,
    ) -> StoreResult<Vec<WorkflowDefinition>>;

    /// Batch load by id, active or not. Missing ids are simply absent.
    async fn workflows_by_ids(
        &self,
        tenant_id: Uuid,
        ids: &[Uuid],
    ) -> StoreResult<Vec<WorkflowDefinition>>;

    async fn insert_run(&self, run: &WorkflowRun) -> StoreResult<()>;

    async fn save_checkpoint(
        &self,
        run_id: Uuid,
        status: RunStatus,
        checkpoint: &RunCheckpoint,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    async fn pending_runs(&self, tenant_id: Uuid) -> StoreResult<Vec<WorkflowRun>>;

    /// Conditional pending -> running transition. `false` means another
    /// sweeper already claimed the run.
    async fn claim_run(&self, tenant_id: Uuid, run_id: Uuid) -> StoreResult<bool>;

    async fn tenants_with_pending_runs(&self) -> StoreResult<Vec<Uuid>>;
}

/// Entity side effects performed by actions: tag assignments and lead/client records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn assigned_tags(
        &self,
        tenant_id: Uuid,
        scope: TriggerScope,
        entity_id: Uuid,
    ) -> StoreResult<HashSet<Uuid>>;

    /// Upsert keyed on (tenant, scope, entity, tag)
    async fn assign_tag(
        &self,
        tenant_id: Uuid,
        scope: TriggerScope,
        entity_id: Uuid,
        tag_id: Uuid,
    ) -> StoreResult<()>;

    /// Delete by key; a missing assignment is not an error
    async fn unassign_tag(
        &self,
        tenant_id: Uuid,
        scope: TriggerScope,
        entity_id: Uuid,
        tag_id: Uuid,
    ) -> StoreResult<()>;

    async fn find_lead(&self, tenant_id: Uuid, lead_id: Uuid) -> StoreResult<Option<Lead>>;

    async fn find_client_by_email(&self, tenant_id: Uuid, email: &str) -> StoreResult<Option<Uuid>>;

    async fn find_client_by_name(&self, tenant_id: Uuid, name: &str) -> StoreResult<Option<Uuid>>;

    async fn create_client(&self, tenant_id: Uuid, client: &NewClient) -> StoreResult<Uuid>;

    /// Sets stage to "won" and links the client
    async fn mark_lead_won(&self, tenant_id: Uuid, lead_id: Uuid, client_id: Uuid) -> StoreResult<()>;

    async fn delete_lead(&self, tenant_id: Uuid, lead_id: Uuid) -> StoreResult<()>;
}
