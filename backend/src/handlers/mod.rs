use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;
use std::sync::Arc;

use crate::AppState;

pub mod automation;
pub mod webhooks;

pub use automation::automation_routes;
pub use webhooks::webhook_routes;

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let database = crate::database::health_check(&state.db_pool).await;
    let status = if database { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(json!({
            "status": if database { "healthy" } else { "degraded" },
            "service": "inspectos-automation",
            "database": database,
            "jobs": state.jobs.job_names(),
        })),
    )
}
