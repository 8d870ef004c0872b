// Webhook Retry Sweep - redelivers durable retries whose backoff has elapsed

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{JobError, JobResult, SweepJob, SweepReport};
use crate::webhooks::WebhookDispatcher;

pub struct WebhookRetrySweep {
    dispatcher: Arc<WebhookDispatcher>,
    batch_size: i64,
}

impl WebhookRetrySweep {
    pub fn new(dispatcher: Arc<WebhookDispatcher>, batch_size: i64) -> Self {
        Self {
            dispatcher,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl SweepJob for WebhookRetrySweep {
    fn name(&self) -> &'static str {
        "webhook_retry_sweep"
    }

    async fn run(&self, now: DateTime<Utc>) -> JobResult<SweepReport> {
        let retries = self
            .dispatcher
            .process_due_retries(now, self.batch_size)
            .await
            .map_err(|e| JobError::ExecutionError(e.to_string()))?;

        let mut report = SweepReport {
            items_processed: retries.delivered + retries.dropped,
            errors: Vec::new(),
        };
        if retries.released > 0 {
            report
                .errors
                .push(format!("{} retries released after storage errors", retries.released));
        }
        if retries.failed > 0 {
            report
                .errors
                .push(format!("{} retries could not be marked done", retries.failed));
        }

        Ok(report)
    }
}
