// Webhook Delivery Worker - sign, send, log, and schedule retries

use chrono::{DateTime, SecondsFormat, Utc};
use inspectos_shared::{RetryStatus, Webhook, WebhookDelivery, WebhookRetry, WebhookStatus};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::retry::{backoff_delay, effective_policy, should_retry};
use super::signature::{self, ATTEMPT_HEADER, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER};
use super::store::WebhookStore;
use super::WebhookEvent;
use crate::config::AutomationConfig;
use crate::database::StoreError;

const STORED_BODY_LIMIT: usize = 5000;
const LAST_ERROR_BODY_LIMIT: usize = 500;
const TEST_BODY_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode webhook payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("webhook {0} not found")]
    NotFound(Uuid),
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub default_timeout: Duration,
    pub require_https: bool,
    pub auto_pause_after: Option<i32>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self::from(&AutomationConfig::default())
    }
}

impl From<&AutomationConfig> for DeliveryConfig {
    fn from(config: &AutomationConfig) -> Self {
        Self {
            default_timeout: config.webhook_default_timeout,
            require_https: config.webhook_require_https,
            auto_pause_after: config.webhook_auto_pause_after,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvelopeMetadata {
    pub webhook_id: Uuid,
    pub delivery_id: Uuid,
}

/// JSON body of every outbound delivery. The signature covers its exact bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookEnvelope {
    pub event: String,
    pub timestamp: String,
    pub tenant_id: Uuid,
    pub data: serde_json::Value,
    pub metadata: EnvelopeMetadata,
}

impl WebhookEnvelope {
    pub fn new(webhook: &Webhook, event: &str, data: serde_json::Value, delivery_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            event: event.to_string(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            tenant_id: webhook.tenant_id,
            data,
            metadata: EnvelopeMetadata {
                webhook_id: webhook.id,
                delivery_id,
            },
        }
    }
}

/// Outcome of one attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub delivery_id: Uuid,
    pub success: bool,
    pub status: Option<u16>,
    pub response_time_ms: Option<i64>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<DateTime<Utc>>,
}

enum Attempt {
    Response { status: u16, body: String, elapsed_ms: i64 },
    Transport { error: String },
    Rejected { error: String },
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

pub struct WebhookDispatcher {
    store: Arc<dyn WebhookStore>,
    client: reqwest::Client,
    config: DeliveryConfig,
}

impl WebhookDispatcher {
    pub fn new(store: Arc<dyn WebhookStore>, config: DeliveryConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(config.default_timeout)
            .build()?;

        Ok(Self { store, client, config })
    }

    pub fn store(&self) -> &dyn WebhookStore {
        self.store.as_ref()
    }

    /// Deliver one attempt to a webhook, scheduling a durable retry on failure.
    ///
    /// Returns `None` without sending when the webhook is missing or not active.
    pub async fn deliver(
        &self,
        webhook_id: Uuid,
        event: &str,
        payload: serde_json::Value,
        attempt: i32,
    ) -> Result<Option<DeliveryReport>, DeliveryError> {
        let Some(webhook) = self.store.find_webhook(webhook_id).await? else {
            debug!(%webhook_id, event, "Webhook not found, skipping delivery");
            return Ok(None);
        };

        if webhook.status != WebhookStatus::Active {
            debug!(%webhook_id, status = webhook.status.as_str(), "Webhook not active, skipping delivery");
            return Ok(None);
        }

        self.attempt(&webhook, event, payload, attempt.max(1), true).await.map(Some)
    }

    /// Send a sample payload once, without retry, to a tenant's webhook.
    pub async fn send_test(
        &self,
        tenant_id: Uuid,
        webhook_id: Uuid,
        event: WebhookEvent,
    ) -> Result<DeliveryReport, DeliveryError> {
        let webhook = self
            .store
            .find_webhook(webhook_id)
            .await?
            .filter(|w| w.tenant_id == tenant_id)
            .ok_or(DeliveryError::NotFound(webhook_id))?;

        let mut report = self
            .attempt(&webhook, event.as_str(), event.sample_payload(), 1, false)
            .await?;
        report.response_body = report.response_body.map(|b| truncate(&b, TEST_BODY_LIMIT));

        Ok(report)
    }

    async fn attempt(
        &self,
        webhook: &Webhook,
        event: &str,
        payload: serde_json::Value,
        attempt: i32,
        retry_on_failure: bool,
    ) -> Result<DeliveryReport, DeliveryError> {
        let now = Utc::now();
        let delivery_id = Uuid::new_v4();
        let policy = effective_policy(webhook);
        let envelope = WebhookEnvelope::new(webhook, event, payload.clone(), delivery_id, now);
        let body = serde_json::to_vec(&envelope)?;

        let outcome = if self.config.require_https && !is_https(&webhook.url) {
            Attempt::Rejected {
                error: "webhook url must use https".to_string(),
            }
        } else {
            let headers = build_headers(webhook, event, delivery_id, attempt, &body);
            let timeout = policy
                .timeout
                .map(Duration::from_millis)
                .unwrap_or(self.config.default_timeout);
            self.send(&webhook.url, headers, body, timeout).await
        };

        let (status, response_body, elapsed_ms, delivery_error, last_error) = match &outcome {
            Attempt::Response { status, body, elapsed_ms } => {
                let ok = (200..300).contains(status);
                (
                    Some(*status),
                    Some(body.clone()),
                    Some(*elapsed_ms),
                    (!ok).then(|| format!("HTTP {}", status)),
                    (!ok).then(|| format!("HTTP {}: {}", status, truncate(body, LAST_ERROR_BODY_LIMIT))),
                )
            }
            Attempt::Transport { error } | Attempt::Rejected { error } => {
                (None, None, None, Some(error.clone()), Some(error.clone()))
            }
        };

        self.store
            .record_delivery(&WebhookDelivery {
                id: delivery_id,
                webhook_id: webhook.id,
                event_type: event.to_string(),
                payload: serde_json::to_value(&envelope)?,
                response_status: status.map(i32::from),
                response_body: response_body.as_deref().map(|b| truncate(b, STORED_BODY_LIMIT)),
                response_time_ms: elapsed_ms,
                error: delivery_error,
                attempt_number: attempt,
                created_at: now,
            })
            .await?;

        let mut report = DeliveryReport {
            delivery_id,
            success: last_error.is_none(),
            status,
            response_time_ms: elapsed_ms,
            response_body,
            error: last_error.clone(),
            retry_at: None,
        };

        let Some(last_error) = last_error else {
            self.store.record_success(webhook.id, now).await?;
            info!(webhook_id = %webhook.id, %delivery_id, event, attempt, "Webhook delivered");
            return Ok(report);
        };

        let failures = self.store.record_failure(webhook.id, &last_error, now).await?;
        warn!(
            webhook_id = %webhook.id,
            %delivery_id,
            event,
            attempt,
            failures,
            error = %last_error,
            "Webhook delivery failed"
        );

        if let Some(limit) = self.config.auto_pause_after {
            if failures >= limit {
                self.store.set_status(webhook.id, WebhookStatus::Failed).await?;
                error!(webhook_id = %webhook.id, failures, "Webhook marked failed after repeated errors");
                return Ok(report);
            }
        }

        let permanent = matches!(outcome, Attempt::Rejected { .. });
        if retry_on_failure && !permanent && should_retry(&policy, attempt) {
            let run_at = now + backoff_delay(policy.backoff, attempt);
            self.store
                .schedule_retry(&WebhookRetry {
                    id: Uuid::new_v4(),
                    webhook_id: webhook.id,
                    tenant_id: webhook.tenant_id,
                    event_type: event.to_string(),
                    payload,
                    attempt_number: attempt + 1,
                    run_at,
                    status: RetryStatus::Pending,
                })
                .await?;
            debug!(webhook_id = %webhook.id, next_attempt = attempt + 1, %run_at, "Webhook retry scheduled");
            report.retry_at = Some(run_at);
        }

        Ok(report)
    }

    async fn send(&self, url: &str, headers: HeaderMap, body: Vec<u8>, timeout: Duration) -> Attempt {
        let started = Instant::now();
        let result = self
            .client
            .post(url)
            .headers(headers)
            .timeout(timeout)
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                Attempt::Response {
                    status,
                    body,
                    elapsed_ms: started.elapsed().as_millis() as i64,
                }
            }
            Err(e) => Attempt::Transport { error: e.to_string() },
        }
    }
}

fn is_https(url: &str) -> bool {
    url::Url::parse(url)
        .map(|u| u.scheme() == "https")
        .unwrap_or(false)
}

/// Standard headers first, then the webhook's custom headers, which win on conflict.
fn build_headers(webhook: &Webhook, event: &str, delivery_id: Uuid, attempt: i32, body: &[u8]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let mut standard = vec![
        (EVENT_HEADER, event.to_string()),
        (DELIVERY_HEADER, delivery_id.to_string()),
        (ATTEMPT_HEADER, attempt.to_string()),
    ];
    if let Some(secret) = webhook.secret.as_deref().filter(|s| !s.is_empty()) {
        standard.push((SIGNATURE_HEADER, signature::signature_header_value(secret, body)));
    }

    let custom = webhook.headers.iter().map(|(k, v)| (k.as_str(), v.clone()));
    for (name, value) in standard.into_iter().chain(custom) {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(webhook_id = %webhook.id, header = name, "Skipping invalid webhook header"),
        }
    }

    headers
}
