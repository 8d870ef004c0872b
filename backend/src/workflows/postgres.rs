// Postgres-backed workflow and entity stores

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use inspectos_shared::{
    Action, Conditions, Lead, NewClient, RunCheckpoint, RunStatus, TriggerScope, TriggerType,
    WorkflowDefinition, WorkflowRun,
};
use sqlx::{FromRow, PgPool};
use std::collections::HashSet;
use uuid::Uuid;

use super::store::{EntityStore, WorkflowStore};
use crate::database::{StoreError, StoreResult};

#[derive(Debug, FromRow)]
struct WorkflowRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    trigger_scope: String,
    trigger_type: String,
    trigger_tag_id: Option<Uuid>,
    actions: serde_json::Value,
    conditions: serde_json::Value,
    delay_minutes: i32,
    is_active: bool,
}

fn corrupt(entity: &'static str, id: Uuid, reason: impl ToString) -> StoreError {
    StoreError::Corrupt {
        entity,
        id,
        reason: reason.to_string(),
    }
}

impl TryFrom<WorkflowRow> for WorkflowDefinition {
    type Error = StoreError;

    fn try_from(row: WorkflowRow) -> Result<Self, Self::Error> {
        let trigger_scope = row
            .trigger_scope
            .parse::<TriggerScope>()
            .map_err(|e| corrupt("workflow", row.id, e))?;
        let trigger_type = row
            .trigger_type
            .parse::<TriggerType>()
            .map_err(|e| corrupt("workflow", row.id, e))?;
        let actions: Vec<Action> = match row.actions {
            serde_json::Value::Null => Vec::new(),
            value => serde_json::from_value(value).map_err(|e| corrupt("workflow", row.id, e))?,
        };
        let conditions: Conditions = match row.conditions {
            serde_json::Value::Null => Conditions::default(),
            value => serde_json::from_value(value).map_err(|e| corrupt("workflow", row.id, e))?,
        };

        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            trigger_scope,
            trigger_type,
            trigger_tag_id: row.trigger_tag_id,
            actions,
            conditions,
            delay_minutes: u32::try_from(row.delay_minutes).unwrap_or(0),
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, FromRow)]
struct RunRow {
    id: Uuid,
    tenant_id: Uuid,
    workflow_id: Uuid,
    scope: String,
    entity_id: Uuid,
    status: String,
    result: serde_json::Value,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<RunRow> for WorkflowRun {
    type Error = StoreError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let scope = row.scope.parse().map_err(|e| corrupt("workflow_run", row.id, e))?;
        let status = row.status.parse().map_err(|e| corrupt("workflow_run", row.id, e))?;
        let result: RunCheckpoint = match row.result {
            serde_json::Value::Null => RunCheckpoint::default(),
            value => serde_json::from_value(value).map_err(|e| corrupt("workflow_run", row.id, e))?,
        };

        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            workflow_id: row.workflow_id,
            scope,
            entity_id: row.entity_id,
            status,
            result,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

const WORKFLOW_COLUMNS: &str = "id, tenant_id, name, trigger_scope, trigger_type, trigger_tag_id, \
     actions, conditions, delay_minutes, is_active";

#[derive(Clone)]
pub struct PgWorkflowStore {
    db_pool: PgPool,
}

impl PgWorkflowStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn active_workflows(
        &self,
        tenant_id: Uuid,
        scope: TriggerScope,
        trigger_type: TriggerType,
    ) -> StoreResult<Vec<WorkflowDefinition>> {
        let query = format!(
            "SELECT {WORKFLOW_COLUMNS} FROM workflows \
             WHERE tenant_id = $1 AND trigger_scope = $2 AND trigger_type = $3 AND is_active = true \
             ORDER BY created_at ASC"
        );

        let rows = sqlx::query_as::<_, WorkflowRow>(&query)
            .bind(tenant_id)
            .bind(scope.as_str())
            .bind(trigger_type.as_str())
            .fetch_all(&self.db_pool)
            .await?;

        rows.into_iter().map(WorkflowDefinition::try_from).collect()
    }

    async fn workflows_by_ids(
        &self,
        tenant_id: Uuid,
        ids: &[Uuid],
    ) -> StoreResult<Vec<WorkflowDefinition>> {
        let query = format!(
            "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE tenant_id = $1 AND id = ANY($2)"
        );

        let rows = sqlx::query_as::<_, WorkflowRow>(&query)
            .bind(tenant_id)
            .bind(ids)
            .fetch_all(&self.db_pool)
            .await?;

        rows.into_iter().map(WorkflowDefinition::try_from).collect()
    }

    async fn insert_run(&self, run: &WorkflowRun) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_runs (id, tenant_id, workflow_id, scope, entity_id, status, result, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(run.id)
        .bind(run.tenant_id)
        .bind(run.workflow_id)
        .bind(run.scope.as_str())
        .bind(run.entity_id)
        .bind(run.status.as_str())
        .bind(serde_json::to_value(&run.result)?)
        .bind(run.created_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn save_checkpoint(
        &self,
        run_id: Uuid,
        status: RunStatus,
        checkpoint: &RunCheckpoint,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE workflow_runs
            SET status = $2, result = $3, completed_at = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind(serde_json::to_value(checkpoint)?)
        .bind(completed_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn pending_runs(&self, tenant_id: Uuid) -> StoreResult<Vec<WorkflowRun>> {
        let rows = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT id, tenant_id, workflow_id, scope, entity_id, status, result, created_at, completed_at
            FROM workflow_runs
            WHERE tenant_id = $1 AND status = 'pending'
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter().map(WorkflowRun::try_from).collect()
    }

    async fn claim_run(&self, tenant_id: Uuid, run_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_runs
            SET status = 'running', updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND status = 'pending'
            "#,
        )
        .bind(run_id)
        .bind(tenant_id)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn tenants_with_pending_runs(&self) -> StoreResult<Vec<Uuid>> {
        let tenants = sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT tenant_id FROM workflow_runs WHERE status = 'pending'",
        )
        .fetch_all(&self.db_pool)
        .await?;

        Ok(tenants)
    }
}

#[derive(Clone)]
pub struct PgEntityStore {
    db_pool: PgPool,
}

impl PgEntityStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn assigned_tags(
        &self,
        tenant_id: Uuid,
        scope: TriggerScope,
        entity_id: Uuid,
    ) -> StoreResult<HashSet<Uuid>> {
        let tags = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT tag_id FROM tag_assignments
            WHERE tenant_id = $1 AND scope = $2 AND entity_id = $3
            "#,
        )
        .bind(tenant_id)
        .bind(scope.as_str())
        .bind(entity_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(tags.into_iter().collect())
    }

    async fn assign_tag(
        &self,
        tenant_id: Uuid,
        scope: TriggerScope,
        entity_id: Uuid,
        tag_id: Uuid,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tag_assignments (tenant_id, tag_id, scope, entity_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, scope, entity_id, tag_id) DO NOTHING
            "#,
        )
        .bind(tenant_id)
        .bind(tag_id)
        .bind(scope.as_str())
        .bind(entity_id)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn unassign_tag(
        &self,
        tenant_id: Uuid,
        scope: TriggerScope,
        entity_id: Uuid,
        tag_id: Uuid,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            DELETE FROM tag_assignments
            WHERE tenant_id = $1 AND scope = $2 AND entity_id = $3 AND tag_id = $4
            "#,
        )
        .bind(tenant_id)
        .bind(scope.as_str())
        .bind(entity_id)
        .bind(tag_id)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn find_lead(&self, tenant_id: Uuid, lead_id: Uuid) -> StoreResult<Option<Lead>> {
        let lead = sqlx::query_as::<_, Lead>(
            r#"
            SELECT id, tenant_id, name, email, phone, source, notes, client_id, stage
            FROM leads
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(lead_id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(lead)
    }

    async fn find_client_by_email(&self, tenant_id: Uuid, email: &str) -> StoreResult<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM clients
            WHERE tenant_id = $1 AND lower(email) = lower($2)
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(email)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(id)
    }

    async fn find_client_by_name(&self, tenant_id: Uuid, name: &str) -> StoreResult<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM clients
            WHERE tenant_id = $1 AND lower(name) = lower($2)
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(name)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(id)
    }

    async fn create_client(&self, tenant_id: Uuid, client: &NewClient) -> StoreResult<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO clients (tenant_id, name, email, phone, notes, inspections_count, total_spent)
            VALUES ($1, $2, $3, $4, $5, 0, 0)
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(&client.name)
        .bind(&client.email)
        .bind(&client.phone)
        .bind(&client.notes)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(id)
    }

    async fn mark_lead_won(&self, tenant_id: Uuid, lead_id: Uuid, client_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE leads SET stage = 'won', client_id = $3, updated_at = NOW()
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(lead_id)
        .bind(client_id)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn delete_lead(&self, tenant_id: Uuid, lead_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM leads WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(lead_id)
            .execute(&self.db_pool)
            .await?;

        Ok(())
    }
}
