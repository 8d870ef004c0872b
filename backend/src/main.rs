use axum::{
    http::Method,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod database;
mod error;
mod handlers;
mod jobs;
mod webhooks;
mod workflows;

pub use error::{ApiError, ApiResult, AppError};


pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub engine: Arc<workflows::WorkflowEngine>,
    pub webhooks: Arc<webhooks::WebhookDispatcher>,
    pub jobs: Arc<jobs::JobScheduler>,
}

pub fn app_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "InspectOS Automation Engine v0.1.0" }))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/automation", handlers::automation_routes())
        .nest("/api/v1/webhooks", handlers::webhook_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(app_state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url, database::PoolConfig::from_env()).await?;

    database::migrate(&db_pool).await?;

    let webhook_store: Arc<dyn webhooks::WebhookStore> =
        Arc::new(webhooks::PgWebhookStore::new(db_pool.clone()));
    let dispatcher = Arc::new(webhooks::WebhookDispatcher::new(
        webhook_store,
        webhooks::DeliveryConfig::from(&config.automation),
    )?);

    let engine = Arc::new(workflows::WorkflowEngine::new(
        Arc::new(workflows::PgWorkflowStore::new(db_pool.clone())),
        Arc::new(workflows::PgEntityStore::new(db_pool.clone())),
        Some(dispatcher.clone()),
        &config.automation,
    ));

    let mut scheduler = jobs::JobScheduler::new().await?;
    scheduler
        .register(
            Arc::new(jobs::WorkflowRunSweep::new(engine.clone())),
            config.automation.workflow_sweep_interval,
        )
        .await?;
    scheduler
        .register(
            Arc::new(jobs::WebhookRetrySweep::new(
                dispatcher.clone(),
                config.automation.sweep_batch_size,
            )),
            config.automation.webhook_retry_interval,
        )
        .await?;
    scheduler.start().await?;
    let scheduler = Arc::new(scheduler);

    let app_state = Arc::new(AppState {
        db_pool,
        engine,
        webhooks: dispatcher,
        jobs: scheduler.clone(),
    });

    let app = app_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server running on {}", config.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
