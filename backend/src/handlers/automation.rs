//! Automation Handlers
//!
//! Entry points for the collaborators that emit trigger contexts and
//! business events, plus operator hooks into the background sweeps.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::jobs::{JobExecutionLog, SweepReport};
use crate::webhooks::WebhookEvent;
use crate::workflows::{ResumeReport, TriggerContext};
use crate::{ApiError, ApiResult, AppState};

// ==================== Structs ====================

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub run_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct EmitEventRequest {
    pub tenant_id: Uuid,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmitEventResponse {
    pub event: String,
    pub dispatched: usize,
}

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<&'static str>,
    pub executions: Vec<JobExecutionLog>,
}

// ==================== Routes ====================

pub fn automation_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/triggers", post(fire_trigger))
        .route("/events", post(emit_event))
        .route("/tenants/:tenant_id/sweep", post(sweep_tenant))
        .route("/jobs", get(list_jobs))
        .route("/jobs/:name/run", post(run_job))
}

// ==================== Handlers ====================

/// Trigger failures never fail the caller; they end up in the log.
async fn fire_trigger(
    State(state): State<Arc<AppState>>,
    Json(ctx): Json<TriggerContext>,
) -> (StatusCode, Json<TriggerResponse>) {
    let run_ids = match state.engine.fire(&ctx).await {
        Ok(ids) => ids,
        Err(e) => {
            error!(
                tenant_id = %ctx.tenant_id,
                entity_id = %ctx.entity_id,
                trigger = ctx.trigger_type.as_str(),
                error = %e,
                "Workflow trigger failed"
            );
            Vec::new()
        }
    };

    (StatusCode::ACCEPTED, Json(TriggerResponse { run_ids }))
}

async fn emit_event(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmitEventRequest>,
) -> ApiResult<(StatusCode, Json<EmitEventResponse>)> {
    let event = req
        .event
        .parse::<WebhookEvent>()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let dispatched = match state
        .webhooks
        .trigger_event(req.tenant_id, event.as_str(), req.payload)
        .await
    {
        Ok(handles) => handles.len(),
        Err(e) => {
            error!(tenant_id = %req.tenant_id, event = event.as_str(), error = %e, "Webhook fan-out failed");
            0
        }
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(EmitEventResponse {
            event: event.as_str().to_string(),
            dispatched,
        }),
    ))
}

async fn sweep_tenant(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<ResumeReport>> {
    let report = state.engine.process_pending_runs(tenant_id, Utc::now()).await?;
    Ok(Json(report))
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<JobsResponse> {
    Json(JobsResponse {
        jobs: state.jobs.job_names(),
        executions: state.jobs.get_execution_logs().await,
    })
}

async fn run_job(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<SweepReport>> {
    let report = state.jobs.run_job_now(&name).await?;
    Ok(Json(report))
}
