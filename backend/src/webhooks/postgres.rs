// Postgres-backed webhook store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use inspectos_shared::{RetryPolicy, Webhook, WebhookDelivery, WebhookRetry, WebhookStatus};
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

use super::store::WebhookStore;
use crate::database::{StoreError, StoreResult};

/// In-flight retries older than this are assumed orphaned by a crashed worker
const STALE_CLAIM_MINUTES: i32 = 10;

#[derive(Debug, FromRow)]
struct WebhookRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    url: String,
    secret: Option<String>,
    headers: serde_json::Value,
    events: Vec<String>,
    status: String,
    retry_strategy: serde_json::Value,
    failure_count: i32,
    last_error: Option<String>,
    last_triggered_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
}

impl TryFrom<WebhookRow> for Webhook {
    type Error = StoreError;

    fn try_from(row: WebhookRow) -> Result<Self, Self::Error> {
        let status: WebhookStatus = row.status.parse().map_err(|e: inspectos_shared::UnknownVariant| {
            StoreError::Corrupt {
                entity: "webhook",
                id: row.id,
                reason: e.to_string(),
            }
        })?;

        // Headers and retry policy are tenant-edited JSON; tolerate junk.
        let headers: BTreeMap<String, String> = serde_json::from_value(row.headers).unwrap_or_else(|e| {
            warn!(webhook_id = %row.id, error = %e, "Ignoring malformed webhook headers");
            BTreeMap::new()
        });
        let retry_strategy: RetryPolicy = serde_json::from_value(row.retry_strategy).unwrap_or_else(|e| {
            warn!(webhook_id = %row.id, error = %e, "Ignoring malformed retry policy");
            RetryPolicy::default()
        });

        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            url: row.url,
            secret: row.secret,
            headers,
            events: row.events,
            status,
            retry_strategy,
            failure_count: row.failure_count,
            last_error: row.last_error,
            last_triggered_at: row.last_triggered_at,
            last_success_at: row.last_success_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RetryRow {
    id: Uuid,
    webhook_id: Uuid,
    tenant_id: Uuid,
    event_type: String,
    payload: serde_json::Value,
    attempt_number: i32,
    run_at: DateTime<Utc>,
    status: String,
}

impl TryFrom<RetryRow> for WebhookRetry {
    type Error = StoreError;

    fn try_from(row: RetryRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|e: inspectos_shared::UnknownVariant| {
            StoreError::Corrupt {
                entity: "webhook_retry",
                id: row.id,
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            id: row.id,
            webhook_id: row.webhook_id,
            tenant_id: row.tenant_id,
            event_type: row.event_type,
            payload: row.payload,
            attempt_number: row.attempt_number,
            run_at: row.run_at,
            status,
        })
    }
}

const WEBHOOK_COLUMNS: &str = "id, tenant_id, name, url, secret, headers, events, status, retry_strategy, \
     failure_count, last_error, last_triggered_at, last_success_at";

#[derive(Clone)]
pub struct PgWebhookStore {
    db_pool: PgPool,
}

impl PgWebhookStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl WebhookStore for PgWebhookStore {
    async fn find_webhook(&self, webhook_id: Uuid) -> StoreResult<Option<Webhook>> {
        let query = format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE id = $1");

        sqlx::query_as::<_, WebhookRow>(&query)
            .bind(webhook_id)
            .fetch_optional(&self.db_pool)
            .await?
            .map(Webhook::try_from)
            .transpose()
    }

    async fn active_webhooks_for_event(&self, tenant_id: Uuid, event: &str) -> StoreResult<Vec<Webhook>> {
        let query = format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhooks \
             WHERE tenant_id = $1 AND status = 'active' AND $2 = ANY(events)"
        );

        let rows = sqlx::query_as::<_, WebhookRow>(&query)
            .bind(tenant_id)
            .bind(event)
            .fetch_all(&self.db_pool)
            .await?;

        rows.into_iter().map(Webhook::try_from).collect()
    }

    async fn record_delivery(&self, delivery: &WebhookDelivery) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_deliveries (
                id, webhook_id, event_type, payload, response_status, response_body,
                response_time_ms, error, attempt_number, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(delivery.id)
        .bind(delivery.webhook_id)
        .bind(&delivery.event_type)
        .bind(&delivery.payload)
        .bind(delivery.response_status)
        .bind(&delivery.response_body)
        .bind(delivery.response_time_ms)
        .bind(&delivery.error)
        .bind(delivery.attempt_number)
        .bind(delivery.created_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn record_success(&self, webhook_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE webhooks
            SET failure_count = 0, last_error = NULL, last_triggered_at = $2,
                last_success_at = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(webhook_id)
        .bind(at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn record_failure(&self, webhook_id: Uuid, error: &str, at: DateTime<Utc>) -> StoreResult<i32> {
        let count = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE webhooks
            SET failure_count = failure_count + 1, last_error = $2, last_triggered_at = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING failure_count
            "#,
        )
        .bind(webhook_id)
        .bind(error)
        .bind(at)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(count.unwrap_or(0))
    }

    async fn set_status(&self, webhook_id: Uuid, status: WebhookStatus) -> StoreResult<()> {
        sqlx::query("UPDATE webhooks SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(webhook_id)
            .bind(status.as_str())
            .execute(&self.db_pool)
            .await?;

        Ok(())
    }

    async fn schedule_retry(&self, retry: &WebhookRetry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_retries (
                id, webhook_id, tenant_id, event_type, payload, attempt_number, run_at, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(retry.id)
        .bind(retry.webhook_id)
        .bind(retry.tenant_id)
        .bind(&retry.event_type)
        .bind(&retry.payload)
        .bind(retry.attempt_number)
        .bind(retry.run_at)
        .bind(retry.status.as_str())
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn claim_due_retries(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<WebhookRetry>> {
        let rows = sqlx::query_as::<_, RetryRow>(
            r#"
            UPDATE webhook_retries
            SET status = 'in_flight', claimed_at = $1, updated_at = NOW()
            WHERE id IN (
                SELECT id FROM webhook_retries
                WHERE run_at <= $1
                  AND (status = 'pending'
                       OR (status = 'in_flight' AND claimed_at < $1 - make_interval(mins => $3)))
                ORDER BY run_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, webhook_id, tenant_id, event_type, payload, attempt_number, run_at, status
            "#,
        )
        .bind(now)
        .bind(limit)
        .bind(STALE_CLAIM_MINUTES)
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter().map(WebhookRetry::try_from).collect()
    }

    async fn complete_retry(&self, retry_id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE webhook_retries SET status = 'done', updated_at = NOW() WHERE id = $1")
            .bind(retry_id)
            .execute(&self.db_pool)
            .await?;

        Ok(())
    }

    async fn release_retry(&self, retry_id: Uuid, run_at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_retries
            SET status = 'pending', run_at = $2, claimed_at = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'in_flight'
            "#,
        )
        .bind(retry_id)
        .bind(run_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }
}
