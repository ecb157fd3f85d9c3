use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::jobs::JobManager;

pub mod assets;
pub mod items;
pub mod jobs;
pub mod parts;

pub fn router(db: Arc<Database>, job_manager: Arc<JobManager>) -> Router {
    Router::new()
        .nest("/assets", assets::router(db.clone(), job_manager.clone()))
        .nest("/items", items::router(db.clone()))
        .nest("/parts", parts::router(db, job_manager.clone()))
        .nest("/jobs", jobs::router(job_manager))
}
