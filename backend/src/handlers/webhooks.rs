//! Webhook Handlers

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::webhooks::{DeliveryReport, WebhookEvent};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct TestWebhookRequest {
    pub tenant_id: Uuid,
    pub event: String,
}

pub fn webhook_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", get(list_events))
        .route("/:id/test", post(send_test_webhook))
}

async fn list_events() -> Json<Vec<&'static str>> {
    Json(WebhookEvent::ALL.iter().map(WebhookEvent::as_str).collect())
}

/// Deliver a sample payload once; the outcome is returned even when the endpoint fails.
async fn send_test_webhook(
    State(state): State<Arc<AppState>>,
    Path(webhook_id): Path<Uuid>,
    Json(req): Json<TestWebhookRequest>,
) -> ApiResult<Json<DeliveryReport>> {
    let event = req
        .event
        .parse::<WebhookEvent>()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let report = state.webhooks.send_test(req.tenant_id, webhook_id, event).await?;
    info!(
        %webhook_id,
        tenant_id = %req.tenant_id,
        event = event.as_str(),
        success = report.success,
        "Test webhook sent"
    );

    Ok(Json(report))
}
