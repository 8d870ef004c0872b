use async_trait::async_trait;
use chrono::{DateTime, Utc};
use inspectos_shared::{Webhook, WebhookDelivery, WebhookRetry, WebhookStatus};
use uuid::Uuid;

use crate::database::StoreResult;

/// Webhook catalog, delivery audit log and durable retry queue.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn find_webhook(&self, webhook_id: Uuid) -> StoreResult<Option<Webhook>>;

    /// Active webhooks of a tenant subscribed to `event`
    async fn active_webhooks_for_event(&self, tenant_id: Uuid, event: &str) -> StoreResult<Vec<Webhook>>;

    /// Append one attempt to the audit log
    async fn record_delivery(&self, delivery: &WebhookDelivery) -> StoreResult<()>;

    /// Reset the failure counter and stamp success
    async fn record_success(&self, webhook_id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    /// Increment the failure counter atomically; returns the new count
    async fn record_failure(&self, webhook_id: Uuid, error: &str, at: DateTime<Utc>) -> StoreResult<i32>;

    async fn set_status(&self, webhook_id: Uuid, status: WebhookStatus) -> StoreResult<()>;

    async fn schedule_retry(&self, retry: &WebhookRetry) -> StoreResult<()>;

    /// Claim up to `limit` due retries, moving them pending -> in_flight
    async fn claim_due_retries(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<WebhookRetry>>;

    async fn complete_retry(&self, retry_id: Uuid) -> StoreResult<()>;

    /// Hand a claimed retry back to the queue to run at `run_at`
    async fn release_retry(&self, retry_id: Uuid, run_at: DateTime<Utc>) -> StoreResult<()>;
}
