use anyhow::Result;
use rusqlite::params;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::jobs::{process_part, upload_asset, JobContext, JobStatus, JobType};

pub struct JobProcessor {
    ctx: Arc<JobContext>,
    workers: Arc<Semaphore>,
}

impl JobProcessor {
    pub fn new(ctx: Arc<JobContext>, max_workers: usize) -> Self {
        JobProcessor {
            ctx,
            workers: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }

    /// Get pending jobs that are ready to run, oldest first. A ProcessPart job
    /// waits until its part's item has been submitted.
    pub fn get_ready_jobs(&self) -> Result<Vec<i64>> {
        let status_str = serde_json::to_string(&JobStatus::Pending)?;
        let rows = {
            let conn = self.ctx.db.conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT id, type, payload_json FROM jobs WHERE status = ?1 ORDER BY created_at ASC, id ASC",
            )?;
            let rows: Vec<(i64, String, Option<String>)> = stmt
                .query_map(params![status_str], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut ready = Vec::new();
        for (job_id, job_type_str, payload_str) in rows {
            let job_type: JobType = serde_json::from_str(&job_type_str)?;
            let is_ready = match job_type {
                JobType::UploadAsset => true,
                JobType::ProcessPart => match Self::payload_id(&payload_str, "part_id") {
                    // A missing part or payload: let process_job fail it.
                    Some(part_id) => self.ctx.db.is_part_submitted(part_id)?.unwrap_or(true),
                    None => true,
                },
            };
            if is_ready {
                ready.push(job_id);
            }
        }
        Ok(ready)
    }

    fn payload_id(payload_str: &Option<String>, key: &str) -> Option<i64> {
        let payload: serde_json::Value = serde_json::from_str(payload_str.as_deref()?).ok()?;
        payload.get(key)?.as_i64()
    }

    /// Runs one claimed job to its final status.
    pub async fn process_job(ctx: &JobContext, job_id: i64) -> Result<()> {
        let job = ctx
            .job_manager
            .get_job(job_id)?
            .ok_or_else(|| anyhow::anyhow!("Job {} not found", job_id))?;

        match job.job_type {
            JobType::UploadAsset => {
                let asset_id = job
                    .payload_id("asset_id")
                    .ok_or_else(|| anyhow::anyhow!("UploadAsset job {} missing asset_id", job_id))?;
                upload_asset::process_upload_asset(ctx, job_id, asset_id).await?;
            }
            JobType::ProcessPart => {
                let part_id = job
                    .payload_id("part_id")
                    .ok_or_else(|| anyhow::anyhow!("ProcessPart job {} missing part_id", job_id))?;
                process_part::process_part(ctx, job_id, part_id).await?;
            }
        }

        ctx.job_manager.finish_job(job_id, JobStatus::Completed)
    }

    /// Starts as many ready jobs as there are free workers.
    pub fn dispatch(&self) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::new();
        for job_id in self.get_ready_jobs()? {
            let permit = match self.workers.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => break,
            };
            if !self.ctx.job_manager.claim_job(job_id)? {
                continue;
            }

            let ctx = self.ctx.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = Self::process_job(&ctx, job_id).await {
                    error!(job_id, error = ?e, "Job failed");
                    if let Err(e) = ctx.job_manager.finish_job(job_id, JobStatus::Failed) {
                        error!(job_id, error = ?e, "Could not mark job as failed");
                    }
                }
            }));
        }
        Ok(handles)
    }

    pub async fn run(&self) {
        match self.ctx.job_manager.requeue_interrupted() {
            Ok(0) => {}
            Ok(requeued) => info!(requeued, "Requeued interrupted jobs"),
            Err(e) => warn!(error = ?e, "Could not requeue interrupted jobs"),
        }

        loop {
            if let Err(e) = self.dispatch() {
                error!(error = ?e, "Error dispatching jobs");
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::tests::test_context;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn seed_part(ctx: &JobContext, submitted: bool) -> i64 {
        let asset_id = ctx.db.create_asset("http://helixware/1.mp4", "guid").unwrap();
        let item_id = ctx.db.create_item(asset_id, "http://mico/marmotta/i", "i").unwrap();
        if submitted {
            ctx.db.mark_item_submitted(item_id).unwrap();
        }
        ctx.db
            .create_part(item_id, "http://mico/marmotta/i/p", "p", "mico:Video", "a.mp4")
            .unwrap()
    }

    #[tokio::test]
    async fn process_part_waits_for_submission() {
        let server = MockServer::start().await;
        let (_dir, ctx) = test_context(&server);
        let waiting = seed_part(&ctx, false);
        let ready = seed_part(&ctx, true);

        let upload = ctx
            .job_manager
            .create_job(JobType::UploadAsset, Some(json!({ "asset_id": 1 })))
            .unwrap();
        let blocked = ctx
            .job_manager
            .create_job(JobType::ProcessPart, Some(json!({ "part_id": waiting })))
            .unwrap();
        let runnable = ctx
            .job_manager
            .create_job(JobType::ProcessPart, Some(json!({ "part_id": ready })))
            .unwrap();

        let processor = JobProcessor::new(Arc::new(ctx), 2);
        let ids = processor.get_ready_jobs().unwrap();

        assert_eq!(ids, vec![upload, runnable]);
        assert!(!ids.contains(&blocked));
    }

    #[tokio::test]
    async fn jobs_for_missing_parts_fail_instead_of_waiting() {
        let server = MockServer::start().await;
        let (_dir, ctx) = test_context(&server);
        let orphan = ctx
            .job_manager
            .create_job(JobType::ProcessPart, Some(json!({ "part_id": 404 })))
            .unwrap();

        let processor = JobProcessor::new(Arc::new(ctx), 1);
        assert_eq!(processor.get_ready_jobs().unwrap(), vec![orphan]);

        for handle in processor.dispatch().unwrap() {
            handle.await.unwrap();
        }
        let job = processor.ctx.job_manager.get_job(orphan).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(processor.get_ready_jobs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failures_are_recorded() {
        let server = MockServer::start().await;
        let (_dir, ctx) = test_context(&server);
        let missing_payload = ctx.job_manager.create_job(JobType::UploadAsset, None).unwrap();
        let missing_asset = ctx
            .job_manager
            .create_job(JobType::UploadAsset, Some(json!({ "asset_id": 99 })))
            .unwrap();

        let processor = JobProcessor::new(Arc::new(ctx), 4);
        for handle in processor.dispatch().unwrap() {
            handle.await.unwrap();
        }

        let manager = &processor.ctx.job_manager;
        assert_eq!(manager.get_job(missing_payload).unwrap().unwrap().status, JobStatus::Failed);
        assert_eq!(manager.get_job(missing_asset).unwrap().unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn dispatch_respects_worker_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broker/status/items"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;
        let (_dir, ctx) = test_context(&server);
        let first = seed_part(&ctx, true);
        let second = seed_part(&ctx, true);
        let a = ctx
            .job_manager
            .create_job(JobType::ProcessPart, Some(json!({ "part_id": first })))
            .unwrap();
        let b = ctx
            .job_manager
            .create_job(JobType::ProcessPart, Some(json!({ "part_id": second })))
            .unwrap();

        let processor = JobProcessor::new(Arc::new(ctx), 1);
        let handles = processor.dispatch().unwrap();
        assert_eq!(handles.len(), 1);

        let manager = processor.ctx.job_manager.clone();
        assert_eq!(manager.get_job(a).unwrap().unwrap().status, JobStatus::Running);
        assert_eq!(manager.get_job(b).unwrap().unwrap().status, JobStatus::Pending);

        // Cancelling releases the worker at the next poll.
        assert!(manager.cancel_job(a).unwrap());
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(manager.get_job(a).unwrap().unwrap().status, JobStatus::Cancelled);

        let handles = processor.dispatch().unwrap();
        assert_eq!(handles.len(), 1);
        assert!(manager.cancel_job(b).unwrap());
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn completed_jobs_finish_with_full_progress() {
        let server = MockServer::start().await;
        let (_dir, ctx) = test_context(&server);
        let asset_id = ctx.db.create_asset("http://helixware/1.mp4", "guid").unwrap();
        let item_id = ctx.db.create_item(asset_id, "http://mico/marmotta/i", "i").unwrap();
        ctx.db.mark_item_submitted(item_id).unwrap();
        let job = ctx
            .job_manager
            .create_job(JobType::UploadAsset, Some(json!({ "asset_id": asset_id })))
            .unwrap();

        let processor = JobProcessor::new(Arc::new(ctx), 1);
        for handle in processor.dispatch().unwrap() {
            handle.await.unwrap();
        }

        let job = processor.ctx.job_manager.get_job(job).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 1.0);
    }
}
