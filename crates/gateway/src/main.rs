use axum::{response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod db;
mod jobs;
mod media;
mod mico;
mod sparql;

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn app(db: Arc<db::Database>, job_manager: Arc<jobs::JobManager>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false);

    Router::new()
        .route("/health", get(health))
        .nest("/api", api::router(db, job_manager))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::Config::from_env()?;
    info!(broker = %config.mico.broker_url, sparql = %config.mico.sparql_select_url, "MICO configured");

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Arc::new(db::Database::new(&config.db_path)?);
    info!("Database initialized at {:?}", config.db_path);

    let job_manager = Arc::new(jobs::JobManager::new(db.clone()));

    let ctx = Arc::new(jobs::JobContext::new(&config, db.clone(), job_manager.clone())?);
    let job_processor = jobs::processor::JobProcessor::new(ctx, config.max_workers);
    let _processor_handle = tokio::spawn(async move {
        job_processor.run().await;
    });

    let app = app(db, job_manager);

    info!("Starting gateway on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
