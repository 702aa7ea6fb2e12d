use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::kitchen::{RemoteFreshness, StatusCounts};
use crate::models::job::{ImageLocation, Job, JobId, JobStatus};

/// Body of `POST /api/v1/jobs`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[garde(length(min = 1, max = 2048))]
    pub image_ref: String,

    #[garde(length(min = 1, max = 200))]
    pub style: Option<String>,
}

/// Query string of `GET /api/v1/jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    pub status: Option<JobStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobResponse {
    pub id: JobId,
    pub image_ref: String,
    pub image_location: ImageLocation,
    pub style: Option<String>,
    pub status: JobStatus,
    pub time_remaining: Option<u32>,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// True until the status source has acknowledged the job.
    pub pending_sync: bool,
}

impl From<&Job> for JobResponse {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            image_ref: job.image_ref.clone(),
            image_location: ImageLocation::of(&job.image_ref),
            style: job.style_tag.clone(),
            status: job.status,
            time_remaining: job.time_remaining,
            created_at: job.created_at.timestamp_millis(),
            pending_sync: job.is_local_only(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
    pub counts: StatusCounts,
    pub remote: RemoteFreshness,
    /// Shown as an "offline" indicator; remote data may be out of date.
    pub offline: bool,
    pub revision: u64,
}
