use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::models::job::{Job, JobId, JobStatus, SyncState};

const REDIS_JOBS_KEY: &str = "letmecook:jobs";

/// A job as remembered across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredJob {
    pub id: JobId,
    pub image_ref: String,
    pub style_tag: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Whether the status source has accepted the job.
    pub uploaded: bool,
}

impl StoredJob {
    pub fn from_job(job: &Job, uploaded: bool) -> Self {
        Self {
            id: job.id.clone(),
            image_ref: job.image_ref.clone(),
            style_tag: job.style_tag.clone(),
            created_at: job.created_at,
            uploaded,
        }
    }

    /// Rebuild a job for display before the status source has been heard from.
    ///
    /// Uploaded jobs are shown as finished until a snapshot says otherwise;
    /// the rest wait in the queue for their upload to be retried.
    pub fn into_job(self) -> Job {
        let (status, sync) = if self.uploaded {
            (JobStatus::Finished, SyncState::Synced)
        } else {
            (JobStatus::Queued, SyncState::PendingUpload)
        };
        Job {
            id: self.id,
            image_ref: self.image_ref,
            style_tag: self.style_tag,
            status,
            time_remaining: None,
            created_at: self.created_at,
            sync,
        }
    }
}

/// Durable list of jobs created on this side.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn list(&self) -> Result<Vec<StoredJob>, StoreError>;

    /// Insert the job, replacing any entry with the same id.
    async fn create(&self, job: &StoredJob) -> Result<(), StoreError>;

    async fn delete(&self, id: &JobId) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// JSON file holding every stored job, rewritten atomically on each change.
pub struct FileLocalStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileLocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<StoredJob>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn write_all(&self, jobs: &[StoredJob]) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let payload = serde_json::to_vec_pretty(jobs)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl LocalStore for FileLocalStore {
    async fn list(&self) -> Result<Vec<StoredJob>, StoreError> {
        let _guard = self.lock.lock().await;
        self.read_all().await
    }

    async fn create(&self, job: &StoredJob) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut jobs = self.read_all().await?;
        match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job.clone(),
            None => jobs.push(job.clone()),
        }
        self.write_all(&jobs).await
    }

    async fn delete(&self, id: &JobId) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut jobs = self.read_all().await?;
        let before = jobs.len();
        jobs.retain(|j| &j.id != id);
        if jobs.len() != before {
            self.write_all(&jobs).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.read_all().await.map(|_| ())
    }
}

/// Redis hash keyed by job id.
pub struct RedisLocalStore {
    client: redis::Client,
}

impl RedisLocalStore {
    pub fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LocalStore for RedisLocalStore {
    async fn list(&self) -> Result<Vec<StoredJob>, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let entries: HashMap<String, String> = conn.hgetall(REDIS_JOBS_KEY).await?;

        let mut jobs = Vec::with_capacity(entries.len());
        for (id, payload) in entries {
            match serde_json::from_str::<StoredJob>(&payload) {
                Ok(job) => jobs.push(job),
                Err(e) => tracing::warn!(job_id = %id, error = %e, "Skipping unreadable stored job"),
            }
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn create(&self, job: &StoredJob) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;
        conn.hset::<_, _, _, ()>(REDIS_JOBS_KEY, job.id.as_str(), payload)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &JobId) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.hdel::<_, _, ()>(REDIS_JOBS_KEY, id.as_str()).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
