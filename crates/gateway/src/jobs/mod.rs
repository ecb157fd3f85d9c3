use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, HelixWareConfig};
use crate::db::{parse_timestamp, Database};
use crate::mico::MicoClient;
use crate::sparql::QueryClient;

pub mod process_part;
pub mod processor;
pub mod upload_asset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobType {
    /// Create a MICO item for an asset, upload its media and submit it.
    UploadAsset,
    /// Wait for MICO to finish a part and store its annotations.
    ProcessPart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: f64,
    pub payload: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// An integer id stored under `key` in the payload.
    pub fn payload_id(&self, key: &str) -> Option<i64> {
        self.payload.as_ref()?.get(key)?.as_i64()
    }
}

pub struct JobManager {
    db: Arc<Database>,
}

/// Everything a running job needs to reach MICO, HelixWare and the database.
pub struct JobContext {
    pub db: Arc<Database>,
    pub job_manager: Arc<JobManager>,
    pub mico: MicoClient,
    pub sparql: QueryClient,
    pub http: reqwest::Client,
    pub helixware: HelixWareConfig,
    pub cache_dir: PathBuf,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl JobContext {
    pub fn new(config: &Config, db: Arc<Database>, job_manager: Arc<JobManager>) -> Result<Self> {
        Ok(JobContext {
            db,
            job_manager,
            mico: MicoClient::new(&config.mico)?,
            sparql: QueryClient::new(&config.mico)?,
            http: reqwest::Client::new(),
            helixware: config.helixware.clone(),
            cache_dir: config.cache_dir.clone(),
            poll_interval: config.mico.poll_interval,
            poll_timeout: config.mico.poll_timeout,
        })
    }
}

impl JobManager {
    pub fn new(db: Arc<Database>) -> Self {
        JobManager { db }
    }

    pub fn create_job(&self, job_type: JobType, payload: Option<Value>) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let status = JobStatus::Pending;
        let job_type_str = serde_json::to_string(&job_type)?;
        let status_str = serde_json::to_string(&status)?;
        let payload_str = payload.as_ref().map(serde_json::to_string).transpose()?;

        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO jobs (type, status, progress, payload_json, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![job_type_str, status_str, 0.0, payload_str, now, now],
        )?;

        Ok(conn.last_insert_rowid())
    }

    pub fn get_job(&self, id: i64) -> Result<Option<Job>> {
        let conn = self.db.conn.lock().unwrap();
        let job = conn
            .query_row(
                "SELECT id, type, status, progress, payload_json, created_at, updated_at FROM jobs WHERE id = ?1",
                params![id],
                |row| {
                    let job_type_str: String = row.get(1)?;
                    let status_str: String = row.get(2)?;
                    let created_at_str: String = row.get(5)?;
                    let updated_at_str: String = row.get(6)?;

                    let job_type = serde_json::from_str(&job_type_str)
                        .map_err(|_e| rusqlite::Error::InvalidColumnType(1, "TEXT".to_string(), rusqlite::types::Type::Text))?;
                    let status = serde_json::from_str(&status_str)
                        .map_err(|_e| rusqlite::Error::InvalidColumnType(2, "TEXT".to_string(), rusqlite::types::Type::Text))?;

                    let payload_str: Option<String> = row.get(4)?;
                    let payload = payload_str
                        .map(|s| serde_json::from_str(&s))
                        .transpose()
                        .map_err(|_| rusqlite::Error::InvalidColumnType(4, "TEXT".to_string(), rusqlite::types::Type::Text))?;

                    Ok(Job {
                        id: row.get(0)?,
                        job_type,
                        status,
                        progress: row.get(3)?,
                        payload,
                        created_at: parse_timestamp(5, &created_at_str)?,
                        updated_at: parse_timestamp(6, &updated_at_str)?,
                    })
                },
            )
            .optional()?;

        Ok(job)
    }

    /// Moves a pending job to Running. Returns false if someone else got to it first
    /// (or it was cancelled).
    pub fn claim_job(&self, id: i64) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let pending = serde_json::to_string(&JobStatus::Pending)?;
        let running = serde_json::to_string(&JobStatus::Running)?;

        let conn = self.db.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE jobs SET status = ?1, progress = 0.0, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![running, now, id, pending],
        )?;
        Ok(changed > 0)
    }

    /// Records progress without touching a status that was changed meanwhile
    /// (a cancelled job stays cancelled).
    pub fn report_progress(&self, id: i64, progress: f64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let running = serde_json::to_string(&JobStatus::Running)?;

        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET progress = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![progress, now, id, running],
        )?;
        Ok(())
    }

    /// Moves a job to a final status unless it was cancelled in the meantime.
    pub fn finish_job(&self, id: i64, status: JobStatus) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let status_str = serde_json::to_string(&status)?;
        let cancelled = serde_json::to_string(&JobStatus::Cancelled)?;
        let progress = if status == JobStatus::Completed { Some(1.0) } else { None };

        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET status = ?1, progress = COALESCE(?2, progress), updated_at = ?3
             WHERE id = ?4 AND status != ?5",
            params![status_str, progress, now, id, cancelled],
        )?;
        Ok(())
    }

    /// Cancels a pending or running job. Returns false when there was nothing to cancel.
    pub fn cancel_job(&self, id: i64) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let cancelled = serde_json::to_string(&JobStatus::Cancelled)?;
        let pending = serde_json::to_string(&JobStatus::Pending)?;
        let running = serde_json::to_string(&JobStatus::Running)?;

        let conn = self.db.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status IN (?4, ?5)",
            params![cancelled, now, id, pending, running],
        )?;
        Ok(changed > 0)
    }

    pub fn is_cancelled(&self, id: i64) -> Result<bool> {
        Ok(matches!(
            self.get_job(id)?.map(|job| job.status),
            Some(JobStatus::Cancelled)
        ))
    }

    /// Puts jobs a previous process left running back in the queue.
    pub fn requeue_interrupted(&self) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let pending = serde_json::to_string(&JobStatus::Pending)?;
        let running = serde_json::to_string(&JobStatus::Running)?;

        let conn = self.db.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE jobs SET status = ?1, progress = 0.0, updated_at = ?2 WHERE status = ?3",
            params![pending, now, running],
        )?;
        Ok(changed)
    }
}
