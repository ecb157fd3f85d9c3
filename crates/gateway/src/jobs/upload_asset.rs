use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};

use crate::jobs::{JobContext, JobType};
use crate::media;
use crate::mico::MICO_VIDEO_TYPE;

/// Part names are a short random token with the extension MICO extractors expect.
fn part_name() -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("{}.mp4", &token[..12])
}

/// Process UploadAsset job: create an item, inject the asset's media as its
/// first part, submit it and queue the part for annotation retrieval.
pub async fn process_upload_asset(ctx: &JobContext, job_id: i64, asset_id: i64) -> Result<()> {
    info!(job_id, asset_id, "Starting upload");

    let asset = ctx
        .db
        .get_asset(asset_id)?
        .ok_or_else(|| anyhow::anyhow!("Asset {} not found", asset_id))?;

    reqwest::Url::parse(&asset.url)
        .with_context(|| format!("Asset {} has an invalid URL: {}", asset_id, asset.url))?;

    let items = ctx.db.get_items_for_asset(asset_id)?;
    if let Some(item) = items.iter().find(|item| item.submitted_at.is_some()) {
        info!(asset_id, item = %item.uri, "Asset already submitted, skipping");
        return Ok(());
    }

    // An interrupted run may have left an unsubmitted item (and part) behind.
    let (item_id, item_uri) = match items.into_iter().last() {
        Some(item) => {
            info!(asset_id, item_id = item.id, uri = %item.uri, "Resuming with existing item");
            (item.id, item.uri)
        }
        None => {
            let created = ctx.mico.create_item().await?;
            let item_id = ctx.db.create_item(asset_id, &created.uri, &created.uuid)?;
            info!(asset_id, item_id, uri = %created.uri, "Item created");
            (item_id, created.uri)
        }
    };
    ctx.job_manager.report_progress(job_id, 0.1)?;

    let part_id = match ctx.db.get_parts_for_item(item_id)?.into_iter().next() {
        Some(part) => {
            info!(item_id, part_id = part.id, uri = %part.uri, "Part already uploaded");
            part.id
        }
        None => {
            if ctx.job_manager.is_cancelled(job_id)? {
                info!(job_id, "Upload cancelled before download");
                return Ok(());
            }

            let media = media::download(&ctx.http, &asset.url, &ctx.helixware, &ctx.cache_dir).await?;
            info!(asset_id, bytes = media.len, path = ?media.path(), "Asset downloaded");
            ctx.job_manager.report_progress(job_id, 0.4)?;

            let name = part_name();
            let part = ctx
                .mico
                .add_part(&item_uri, MICO_VIDEO_TYPE, &name, media.body()?, Some(media.len))
                .await?;
            drop(media);

            let part_id = ctx
                .db
                .create_part(item_id, &part.uri, &part.uuid, MICO_VIDEO_TYPE, &name)?;
            info!(item_id, part_id, uri = %part.uri, %name, "Part created");
            part_id
        }
    };
    ctx.job_manager.report_progress(job_id, 0.8)?;

    if ctx.job_manager.is_cancelled(job_id)? {
        warn!(job_id, item = %item_uri, "Upload cancelled, item left unsubmitted");
        return Ok(());
    }

    ctx.mico.submit(&item_uri).await?;
    ctx.db.mark_item_submitted(item_id)?;

    let process_job = ctx
        .job_manager
        .create_job(JobType::ProcessPart, Some(json!({ "part_id": part_id })))?;
    info!(item_id, part_id, process_job, "Item submitted");

    Ok(())
}
