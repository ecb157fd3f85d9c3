use annotations::{Fragment, FragmentKind};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::db::{Database, Part, StoredFragment};
use crate::jobs::{JobManager, JobType};

#[derive(Serialize)]
pub struct PartResponse {
    id: i64,
    item_id: i64,
    uri: String,
    uuid: String,
    mime_type: String,
    name: String,
    processed_at: Option<String>,
    created_at: String,
}

impl From<Part> for PartResponse {
    fn from(part: Part) -> Self {
        PartResponse {
            id: part.id,
            item_id: part.item_id,
            uri: part.uri,
            uuid: part.uuid,
            mime_type: part.mime_type,
            name: part.name,
            processed_at: part.processed_at.map(|t| t.to_rfc3339()),
            created_at: part.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct FragmentResponse {
    id: i64,
    part_id: i64,
    #[serde(flatten)]
    fragment: Fragment,
    created_at: String,
}

impl From<StoredFragment> for FragmentResponse {
    fn from(stored: StoredFragment) -> Self {
        FragmentResponse {
            id: stored.id,
            part_id: stored.part_id,
            fragment: stored.fragment,
            created_at: stored.created_at.to_rfc3339(),
        }
    }
}

#[derive(Deserialize)]
pub struct FragmentQuery {
    kind: Option<String>,
}

#[derive(Serialize)]
pub struct ProcessResponse {
    job_id: i64,
}

pub fn router(db: Arc<Database>, job_manager: Arc<JobManager>) -> Router {
    Router::new()
        .route("/:id", get(get_part))
        .route("/:id/fragments", get(list_fragments))
        .route("/:id/process", post(process_part))
        .with_state((db, job_manager))
}

async fn get_part(
    State((db, _job_manager)): State<(Arc<Database>, Arc<JobManager>)>,
    Path(id): Path<i64>,
) -> Result<Json<PartResponse>, StatusCode> {
    let part = db
        .get_part(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(part.into()))
}

async fn list_fragments(
    State((db, _job_manager)): State<(Arc<Database>, Arc<JobManager>)>,
    Path(id): Path<i64>,
    Query(query): Query<FragmentQuery>,
) -> Result<Json<Vec<FragmentResponse>>, StatusCode> {
    let kind = query
        .kind
        .as_deref()
        .map(str::parse::<FragmentKind>)
        .transpose()
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    db.get_part(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    let fragments = db
        .get_fragments_for_part(id, kind)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(fragments.into_iter().map(FragmentResponse::from).collect()))
}

/// Queues another annotation run for the part.
async fn process_part(
    State((db, job_manager)): State<(Arc<Database>, Arc<JobManager>)>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<ProcessResponse>), StatusCode> {
    db.get_part(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    let job_id = job_manager
        .create_job(JobType::ProcessPart, Some(json!({ "part_id": id })))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    info!(part_id = id, job_id, "Part queued for processing");

    Ok((StatusCode::ACCEPTED, Json(ProcessResponse { job_id })))
}
