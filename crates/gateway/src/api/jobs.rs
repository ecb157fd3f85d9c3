use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::jobs::{Job, JobManager};

#[derive(Serialize)]
pub struct JobResponse {
    id: i64,
    job_type: String,
    status: String,
    progress: f64,
    payload: Option<serde_json::Value>,
    created_at: String,
    updated_at: String,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        JobResponse {
            id: job.id,
            job_type: format!("{:?}", job.job_type),
            status: format!("{:?}", job.status),
            progress: job.progress,
            payload: job.payload,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct CancelResponse {
    cancelled: bool,
}

pub fn router(job_manager: Arc<JobManager>) -> Router {
    Router::new()
        .route("/:id", get(get_job))
        .route("/:id/cancel", post(cancel_job))
        .with_state(job_manager)
}

async fn get_job(
    State(job_manager): State<Arc<JobManager>>,
    Path(id): Path<i64>,
) -> Result<Json<JobResponse>, StatusCode> {
    let job = job_manager
        .get_job(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(job.into()))
}

/// `cancelled` is false when the job had already finished.
async fn cancel_job(
    State(job_manager): State<Arc<JobManager>>,
    Path(id): Path<i64>,
) -> Result<Json<CancelResponse>, StatusCode> {
    job_manager
        .get_job(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    let cancelled = job_manager
        .cancel_job(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if cancelled {
        info!(job_id = id, "Job cancelled");
    }
    Ok(Json(CancelResponse { cancelled }))
}
