use annotations::sparql as statements;
use annotations::{extract, mentions, Fragment};
use anyhow::Result;
use std::time::Instant;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::jobs::JobContext;
use crate::sparql::QueryClient;

#[derive(Debug, PartialEq, Eq)]
enum Wait {
    Finished,
    Cancelled,
}

/// Resolves once the job has been cancelled.
async fn cancellation(ctx: &JobContext, job_id: i64) -> Result<()> {
    loop {
        if ctx.job_manager.is_cancelled(job_id)? {
            return Ok(());
        }
        sleep(ctx.poll_interval).await;
    }
}

/// Polls `status/items` until MICO reports the item finished. Failed, empty or
/// unanswered status calls count as "not yet"; a call never outlives the poll
/// timeout and is abandoned as soon as the job is cancelled.
async fn wait_until_finished(ctx: &JobContext, job_id: i64, item_uri: &str) -> Result<Wait> {
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        if ctx.job_manager.is_cancelled(job_id)? {
            return Ok(Wait::Cancelled);
        }

        attempts += 1;
        let budget = ctx.poll_timeout.saturating_sub(started.elapsed());
        let status = tokio::select! {
            status = timeout(budget, ctx.mico.check_status(item_uri, true)) => status,
            cancelled = cancellation(ctx, job_id) => {
                cancelled?;
                return Ok(Wait::Cancelled);
            }
        };

        match status {
            Ok(Ok(statuses)) if statuses.first().map_or(false, |status| status.finished) => {
                info!(item = %item_uri, attempts, "Item finished");
                return Ok(Wait::Finished);
            }
            Ok(Ok(statuses)) => debug!(item = %item_uri, attempts, entries = statuses.len(), "Item not finished yet"),
            Ok(Err(e)) => warn!(item = %item_uri, attempts, error = %e, "Status check failed"),
            Err(_) => warn!(item = %item_uri, attempts, "Status check got no answer in time"),
        }

        let elapsed = started.elapsed();
        if elapsed >= ctx.poll_timeout {
            anyhow::bail!(
                "Item {} did not finish within {}s",
                item_uri,
                ctx.poll_timeout.as_secs()
            );
        }

        // Polling takes the first 70% of the progress bar.
        let waited = elapsed.as_secs_f64() / ctx.poll_timeout.as_secs_f64();
        ctx.job_manager.report_progress(job_id, 0.7 * waited.min(1.0))?;

        sleep(ctx.poll_interval).await;
    }
}

/// Runs the shot, face and entity queries against Marmotta for one item.
pub async fn collect_fragments(sparql: &QueryClient, item_uri: &str) -> Result<Vec<Fragment>> {
    let shots = sparql.select(&statements::shot_boundaries(item_uri)?).await?;
    let mut fragments = extract::sequence_fragments(&shots);
    debug!(item = %item_uri, sequences = fragments.len(), "Shot boundaries loaded");

    let faces = sparql.select(&statements::face_detections(item_uri)?).await?;
    for face in extract::face_candidates(&faces) {
        let temporal = sparql
            .select(&statements::temporal_fragments(&face.annotation)?)
            .await?;
        let placed = extract::face_fragments(&face, &temporal);
        if placed.is_empty() {
            debug!(annotation = %face.annotation, "Face has no time range, dropped");
        }
        fragments.extend(placed);
    }

    let tsv = sparql
        .select_tsv(&statements::entity_mentions(item_uri)?)
        .await?;
    fragments.extend(mentions::parse_entity_mentions(&tsv));

    Ok(fragments)
}

/// Process ProcessPart job: wait for MICO, then replace the part's fragments
/// with what Marmotta holds for its item.
pub async fn process_part(ctx: &JobContext, job_id: i64, part_id: i64) -> Result<()> {
    let (part, item) = ctx
        .db
        .get_part_with_item(part_id)?
        .ok_or_else(|| anyhow::anyhow!("Part {} not found", part_id))?;

    if item.submitted_at.is_none() {
        anyhow::bail!("Item {} of part {} was never submitted", item.uri, part_id);
    }

    info!(job_id, part_id, item = %item.uri, "Waiting for MICO");
    if wait_until_finished(ctx, job_id, &item.uri).await? == Wait::Cancelled {
        info!(job_id, part_id, "Processing cancelled");
        return Ok(());
    }

    let fragments = collect_fragments(&ctx.sparql, &item.uri).await?;
    ctx.job_manager.report_progress(job_id, 0.9)?;

    if ctx.job_manager.is_cancelled(job_id)? {
        info!(job_id, part_id, "Processing cancelled, fragments not stored");
        return Ok(());
    }

    let stored = ctx.db.replace_fragments(part.id, &fragments)?;
    info!(job_id, part_id, stored, "Fragments stored");

    Ok(())
}
