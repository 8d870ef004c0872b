// Webhook retry policy and the durable retry sweep

use chrono::{DateTime, Duration, Utc};
use inspectos_shared::{BackoffStrategy, RetryPolicy, Webhook};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use validator::Validate;

use super::delivery::{DeliveryError, WebhookDispatcher};

/// Delay before the next attempt after attempt `attempt` (1-based) failed.
///
/// Exponential: 2s, 4s, 8s, 16s ... Linear: 1s, 2s, 3s ...
pub fn backoff_delay(strategy: BackoffStrategy, attempt: i32) -> Duration {
    let attempt = attempt.max(1);
    match strategy {
        BackoffStrategy::Exponential => Duration::seconds(1_i64 << attempt.min(30)),
        BackoffStrategy::Linear => Duration::seconds(i64::from(attempt)),
    }
}

pub fn should_retry(policy: &RetryPolicy, attempt: i32) -> bool {
    i64::from(attempt) < i64::from(policy.max_attempts)
}

/// The webhook's stored policy, or the default when it is out of range.
pub fn effective_policy(webhook: &Webhook) -> RetryPolicy {
    match webhook.retry_strategy.validate() {
        Ok(()) => webhook.retry_strategy,
        Err(e) => {
            warn!(webhook_id = %webhook.id, error = %e, "Invalid retry policy, using defaults");
            RetryPolicy::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetrySweepReport {
    pub claimed: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub released: usize,
    /// Handled retries whose queue row could not be marked done
    pub failed: usize,
}

impl WebhookDispatcher {
    /// Claim due retry records and redeliver each one.
    ///
    /// A retry whose webhook is gone or no longer active is dropped. A retry
    /// that hits a storage error is released back to the queue. Per-row
    /// failures are logged and counted; the rest of the batch still runs.
    pub async fn process_due_retries(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<RetrySweepReport, DeliveryError> {
        let claimed = self.store().claim_due_retries(now, limit).await?;
        let mut report = RetrySweepReport {
            claimed: claimed.len(),
            ..RetrySweepReport::default()
        };

        for retry in claimed {
            match self
                .deliver(retry.webhook_id, &retry.event_type, retry.payload.clone(), retry.attempt_number)
                .await
            {
                Ok(Some(_)) => report.delivered += 1,
                Ok(None) => {
                    debug!(retry_id = %retry.id, webhook_id = %retry.webhook_id, "Dropping retry for inactive webhook");
                    report.dropped += 1;
                }
                Err(e) => {
                    error!(retry_id = %retry.id, webhook_id = %retry.webhook_id, error = %e, "Webhook retry failed");
                    let run_at = now + backoff_delay(BackoffStrategy::Exponential, retry.attempt_number);
                    if let Err(e) = self.store().release_retry(retry.id, run_at).await {
                        error!(retry_id = %retry.id, error = %e, "Failed to release webhook retry");
                    }
                    report.released += 1;
                    continue;
                }
            }

            if let Err(e) = self.store().complete_retry(retry.id).await {
                error!(retry_id = %retry.id, error = %e, "Failed to mark webhook retry done");
                report.failed += 1;
            }
        }

        if report.claimed > 0 {
            info!(
                claimed = report.claimed,
                delivered = report.delivered,
                dropped = report.dropped,
                released = report.released,
                failed = report.failed,
                "Webhook retries processed"
            );
        }

        Ok(report)
    }
}
