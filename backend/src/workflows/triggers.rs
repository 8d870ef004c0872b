// Workflow Triggers - match fired trigger contexts to active workflow definitions

use inspectos_shared::{TriggerScope, TriggerType, WorkflowDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::engine::{RunTarget, WorkflowEngine};
use super::EngineResult;

/// What just happened to an entity, as reported by the surrounding application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerContext {
    pub tenant_id: Uuid,
    pub scope: TriggerScope,
    pub entity_id: Uuid,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub tag_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<String>,
    /// Tags the caller knows are assigned, merged with the stored set
    #[serde(default)]
    pub assigned_tag_ids: Option<Vec<Uuid>>,
}

impl TriggerContext {
    fn target(&self) -> RunTarget {
        RunTarget {
            tenant_id: self.tenant_id,
            scope: self.scope,
            entity_id: self.entity_id,
        }
    }

    fn known_tags(&self) -> Option<HashSet<Uuid>> {
        self.assigned_tag_ids
            .as_ref()
            .map(|ids| ids.iter().copied().collect())
    }
}

impl WorkflowEngine {
    /// Dispatch a trigger context by kind. Returns ids of the runs created.
    pub async fn fire(&self, ctx: &TriggerContext) -> EngineResult<Vec<Uuid>> {
        match ctx.trigger_type {
            TriggerType::TagAdded | TriggerType::TagRemoved => {
                let Some(tag_id) = ctx.tag_id else {
                    warn!(
                        tenant_id = %ctx.tenant_id,
                        trigger = ctx.trigger_type.as_str(),
                        "Tag trigger fired without a tag id"
                    );
                    return Ok(Vec::new());
                };
                self.run_workflows_for_tag_change(ctx, tag_id).await
            }
            TriggerType::StatusChanged => self.run_workflows_for_status_change(ctx).await,
            TriggerType::Event => self.run_workflows_for_event(ctx).await,
        }
    }

    pub async fn run_workflows_for_tag_change(
        &self,
        ctx: &TriggerContext,
        tag_id: Uuid,
    ) -> EngineResult<Vec<Uuid>> {
        let workflows: Vec<WorkflowDefinition> = self
            .workflow_store()
            .active_workflows(ctx.tenant_id, ctx.scope, ctx.trigger_type)
            .await?
            .into_iter()
            .filter(|w| w.matches_tag(tag_id))
            .collect();

        self.run_matching(ctx, &workflows).await
    }

    /// A status trigger without a status matches nothing.
    pub async fn run_workflows_for_status_change(&self, ctx: &TriggerContext) -> EngineResult<Vec<Uuid>> {
        if ctx.status.is_none() {
            warn!(
                tenant_id = %ctx.tenant_id,
                entity_id = %ctx.entity_id,
                "Status trigger fired without a status"
            );
            return Ok(Vec::new());
        }

        let workflows = self
            .workflow_store()
            .active_workflows(ctx.tenant_id, ctx.scope, TriggerType::StatusChanged)
            .await?;

        self.run_matching(ctx, &workflows).await
    }

    pub async fn run_workflows_for_event(&self, ctx: &TriggerContext) -> EngineResult<Vec<Uuid>> {
        let workflows = self
            .workflow_store()
            .active_workflows(ctx.tenant_id, ctx.scope, TriggerType::Event)
            .await?;

        self.run_matching(ctx, &workflows).await
    }

    /// Fetch the entity's tag set at most once and hand it to every match.
    /// A failing workflow is logged and does not stop the others.
    async fn run_matching(
        &self,
        ctx: &TriggerContext,
        workflows: &[WorkflowDefinition],
    ) -> EngineResult<Vec<Uuid>> {
        if workflows.is_empty() {
            debug!(
                tenant_id = %ctx.tenant_id,
                scope = ctx.scope.as_str(),
                trigger = ctx.trigger_type.as_str(),
                "No matching workflows"
            );
            return Ok(Vec::new());
        }

        let target = ctx.target();
        let assigned = if workflows.iter().any(|w| w.conditions.needs_tags()) {
            let mut tags = self
                .entity_store()
                .assigned_tags(target.tenant_id, target.scope, target.entity_id)
                .await?;
            if let Some(known) = ctx.known_tags() {
                tags.extend(known);
            }
            Some(tags)
        } else {
            None
        };

        let mut run_ids = Vec::new();
        for workflow in workflows {
            match self
                .run_workflow(workflow, target, ctx.status.as_deref(), assigned.as_ref())
                .await
            {
                Ok(Some(run_id)) => run_ids.push(run_id),
                Ok(None) => {}
                Err(e) => {
                    error!(
                        tenant_id = %ctx.tenant_id,
                        workflow_id = %workflow.id,
                        entity_id = %ctx.entity_id,
                        error = %e,
                        "Workflow execution failed"
                    );
                }
            }
        }

        info!(
            tenant_id = %ctx.tenant_id,
            trigger = ctx.trigger_type.as_str(),
            matched = workflows.len(),
            runs = run_ids.len(),
            "Trigger processed"
        );

        Ok(run_ids)
    }
}
