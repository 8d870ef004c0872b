// Webhook Fan-out - one business event to every subscribed webhook

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::delivery::WebhookDispatcher;
use crate::database::StoreResult;

impl WebhookDispatcher {
    /// Spawn a delivery for each active webhook of the tenant subscribed to
    /// `event`. Returns as soon as the deliveries are spawned; failures are
    /// only visible in the delivery log.
    pub async fn trigger_event(
        self: &Arc<Self>,
        tenant_id: Uuid,
        event: &str,
        payload: serde_json::Value,
    ) -> StoreResult<Vec<JoinHandle<()>>> {
        let webhooks = self.store().active_webhooks_for_event(tenant_id, event).await?;

        if webhooks.is_empty() {
            debug!(%tenant_id, event, "No webhooks subscribed to event");
            return Ok(Vec::new());
        }

        info!(%tenant_id, event, webhooks = webhooks.len(), "Dispatching webhook event");

        Ok(webhooks
            .iter()
            .map(|hook| self.dispatch_to(hook.id, event, payload.clone(), 1))
            .collect())
    }

    /// Deliver to a single webhook in the background
    pub fn dispatch_to(
        self: &Arc<Self>,
        webhook_id: Uuid,
        event: &str,
        payload: serde_json::Value,
        attempt: i32,
    ) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        let event = event.to_string();

        tokio::spawn(async move {
            if let Err(e) = dispatcher.deliver(webhook_id, &event, payload, attempt).await {
                error!(%webhook_id, event = %event, error = %e, "Webhook delivery errored");
            }
        })
    }
}
