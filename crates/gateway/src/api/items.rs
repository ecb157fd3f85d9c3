use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::api::parts::PartResponse;
use crate::db::{Database, Item};

#[derive(Serialize)]
pub struct ItemResponse {
    id: i64,
    asset_id: i64,
    uri: String,
    uuid: String,
    submitted_at: Option<String>,
    created_at: String,
}

impl From<Item> for ItemResponse {
    fn from(item: Item) -> Self {
        ItemResponse {
            id: item.id,
            asset_id: item.asset_id,
            uri: item.uri,
            uuid: item.uuid,
            submitted_at: item.submitted_at.map(|t| t.to_rfc3339()),
            created_at: item.created_at.to_rfc3339(),
        }
    }
}

pub fn router(db: Arc<Database>) -> Router {
    Router::new()
        .route("/:id/parts", get(list_parts))
        .with_state(db)
}

async fn list_parts(
    State(db): State<Arc<Database>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PartResponse>>, StatusCode> {
    db.get_item(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    let parts = db
        .get_parts_for_item(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(parts.into_iter().map(PartResponse::from).collect()))
}
