use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::items::ItemResponse;
use crate::db::{Asset, Database};
use crate::jobs::{JobManager, JobType};

const MAX_FIELD_LEN: usize = 1024;

#[derive(Deserialize)]
pub struct CreateAssetRequest {
    pub url: String,
    #[serde(default)]
    pub guid: String,
}

#[derive(Serialize)]
pub struct CreateAssetResponse {
    id: i64,
    job_id: i64,
}

#[derive(Serialize)]
pub struct AssetResponse {
    id: i64,
    url: String,
    guid: String,
    created_at: String,
}

impl From<Asset> for AssetResponse {
    fn from(asset: Asset) -> Self {
        AssetResponse {
            id: asset.id,
            url: asset.url,
            guid: asset.guid,
            created_at: asset.created_at.to_rfc3339(),
        }
    }
}

pub fn router(db: Arc<Database>, job_manager: Arc<JobManager>) -> Router {
    Router::new()
        .route("/", get(list_assets).post(create_asset))
        .route("/:id", get(get_asset))
        .route("/:id/items", get(list_items))
        .with_state((db, job_manager))
}

/// Stores the asset and queues its upload to MICO.
async fn create_asset(
    State((db, job_manager)): State<(Arc<Database>, Arc<JobManager>)>,
    Json(request): Json<CreateAssetRequest>,
) -> Result<(StatusCode, Json<CreateAssetResponse>), StatusCode> {
    if request.url.len() > MAX_FIELD_LEN || request.guid.len() > MAX_FIELD_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }
    if let Err(e) = reqwest::Url::parse(&request.url) {
        warn!(url = %request.url, error = %e, "Rejecting asset with invalid URL");
        return Err(StatusCode::BAD_REQUEST);
    }

    let id = db
        .create_asset(&request.url, &request.guid)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let job_id = job_manager
        .create_job(JobType::UploadAsset, Some(json!({ "asset_id": id })))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    info!(asset_id = id, job_id, url = %request.url, "Asset created");

    Ok((StatusCode::CREATED, Json(CreateAssetResponse { id, job_id })))
}

async fn list_assets(
    State((db, _job_manager)): State<(Arc<Database>, Arc<JobManager>)>,
) -> Result<Json<Vec<AssetResponse>>, StatusCode> {
    let assets = db
        .get_all_assets()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(assets.into_iter().map(AssetResponse::from).collect()))
}

async fn get_asset(
    State((db, _job_manager)): State<(Arc<Database>, Arc<JobManager>)>,
    Path(id): Path<i64>,
) -> Result<Json<AssetResponse>, StatusCode> {
    let asset = db
        .get_asset(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(asset.into()))
}

async fn list_items(
    State((db, _job_manager)): State<(Arc<Database>, Arc<JobManager>)>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ItemResponse>>, StatusCode> {
    db.get_asset(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    let items = db
        .get_items_for_asset(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(items.into_iter().map(ItemResponse::from).collect()))
}
