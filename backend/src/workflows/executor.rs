// Workflow Executor - performs a single action for a run

use inspectos_shared::{Action, ActionOutcome, ActionStatus, TriggerScope, WorkflowRun};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::lead_conversion::{convert_lead, ConversionOutcome};
use super::store::EntityStore;
use crate::database::StoreResult;
use crate::webhooks::{WebhookDispatcher, WebhookEvent};

/// Context for action execution
#[derive(Debug, Clone, Copy)]
pub struct RunContext {
    pub tenant_id: Uuid,
    pub scope: TriggerScope,
    pub entity_id: Uuid,
    pub workflow_id: Uuid,
    pub run_id: Uuid,
}

impl From<&WorkflowRun> for RunContext {
    fn from(run: &WorkflowRun) -> Self {
        Self {
            tenant_id: run.tenant_id,
            scope: run.scope,
            entity_id: run.entity_id,
            workflow_id: run.workflow_id,
            run_id: run.id,
        }
    }
}

pub struct ActionExecutor {
    entities: Arc<dyn EntityStore>,
    webhooks: Option<Arc<WebhookDispatcher>>,
}

impl ActionExecutor {
    pub fn new(entities: Arc<dyn EntityStore>, webhooks: Option<Arc<WebhookDispatcher>>) -> Self {
        Self { entities, webhooks }
    }

    /// Execute one action. Missing config and lookup misses come back as
    /// `skipped`; only storage failures are returned as errors.
    pub async fn execute(&self, ctx: &RunContext, action: &Action) -> StoreResult<ActionOutcome> {
        debug!(run_id = %ctx.run_id, action = action.kind(), "Executing action");

        let outcome = match action {
            Action::AddTag(config) => match config.tag_id {
                Some(tag_id) => {
                    self.entities
                        .assign_tag(ctx.tenant_id, ctx.scope, ctx.entity_id, tag_id)
                        .await?;
                    ActionOutcome::ok(action.kind())
                }
                None => ActionOutcome::skipped(action.kind(), None),
            },
            Action::RemoveTag(config) => match config.tag_id {
                Some(tag_id) => {
                    self.entities
                        .unassign_tag(ctx.tenant_id, ctx.scope, ctx.entity_id, tag_id)
                        .await?;
                    ActionOutcome::ok(action.kind())
                }
                None => ActionOutcome::skipped(action.kind(), None),
            },
            Action::SendEmail(config) => {
                let mut outcome = ActionOutcome::new(action.kind(), ActionStatus::Queued);
                outcome.template_id = config.template_id.clone();
                outcome
            }
            Action::Notify(config) => {
                info!(
                    tenant_id = %ctx.tenant_id,
                    run_id = %ctx.run_id,
                    message = config.message.as_deref().unwrap_or(""),
                    "Workflow notification"
                );
                let mut outcome = ActionOutcome::new(action.kind(), ActionStatus::Noted);
                outcome.message = config.message.clone();
                outcome
            }
            Action::Wait(config) => ActionOutcome::wait(config.minutes),
            Action::ConvertLeadToClient(config) => {
                if ctx.scope != TriggerScope::Lead {
                    ActionOutcome::skipped(action.kind(), Some("unsupported_scope"))
                } else {
                    match convert_lead(self.entities.as_ref(), ctx.tenant_id, ctx.entity_id, config.delete_lead)
                        .await?
                    {
                        ConversionOutcome::Converted(resolution) => {
                            let mut outcome = ActionOutcome::new(action.kind(), ActionStatus::Converted);
                            outcome.client_id = Some(resolution.client_id());
                            outcome
                        }
                        ConversionOutcome::LeadNotFound => {
                            ActionOutcome::skipped(action.kind(), Some("lead_not_found"))
                        }
                    }
                }
            }
            Action::Webhook(config) => self.dispatch_webhook(ctx, config.event.as_deref(), config.webhook_id).await?,
            Action::Unknown { kind, .. } => {
                warn!(run_id = %ctx.run_id, action = %kind, "Skipping unknown action type");
                ActionOutcome::skipped(kind.clone(), Some("unknown_action"))
            }
        };

        Ok(outcome)
    }

    async fn dispatch_webhook(
        &self,
        ctx: &RunContext,
        event: Option<&str>,
        webhook_id: Option<Uuid>,
    ) -> StoreResult<ActionOutcome> {
        const KIND: &str = "webhook";

        let Some(event) = event.filter(|e| !e.is_empty()) else {
            return Ok(ActionOutcome::skipped(KIND, Some("missing_event")));
        };
        let Ok(event) = event.parse::<WebhookEvent>() else {
            return Ok(ActionOutcome::skipped(KIND, Some("unknown_event")));
        };
        let Some(dispatcher) = &self.webhooks else {
            return Ok(ActionOutcome::skipped(KIND, Some("webhooks_disabled")));
        };

        let payload = serde_json::json!({
            "workflow_id": ctx.workflow_id,
            "run_id": ctx.run_id,
            "scope": ctx.scope,
            "entity_id": ctx.entity_id,
        });

        let dispatched = match webhook_id {
            Some(webhook_id) => {
                let webhook = dispatcher.store().find_webhook(webhook_id).await?;
                match webhook {
                    Some(hook) if hook.tenant_id == ctx.tenant_id => {
                        dispatcher.dispatch_to(hook.id, event.as_str(), payload, 1);
                        1
                    }
                    _ => return Ok(ActionOutcome::skipped(KIND, Some("webhook_not_found"))),
                }
            }
            None => dispatcher
                .trigger_event(ctx.tenant_id, event.as_str(), payload)
                .await?
                .len(),
        };

        let mut outcome = ActionOutcome::new(KIND, ActionStatus::Queued);
        outcome.dispatched = Some(dispatched);
        Ok(outcome)
    }
}
