use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString, IntoStaticStr};
use tokio::time::Instant;
use uuid::Uuid;

/// Stable identifier of a job. Never reused once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh id for a job created on this side of the status source.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Lifecycle status of a job in the kitchen.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Cooking,
    Finished,
}

impl JobStatus {
    pub const ALL: [JobStatus; 3] = [JobStatus::Queued, JobStatus::Cooking, JobStatus::Finished];
}

/// How far the status source knows about a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// Reported by the status source at least once.
    #[default]
    Synced,
    /// Created remotely at `at`, not yet listed by any snapshot.
    Uploaded { at: Instant },
    /// Only known locally; creation will be retried on the next sync.
    PendingUpload,
}

/// A cooking job as tracked by the kitchen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub image_ref: String,
    pub style_tag: Option<String>,
    pub status: JobStatus,
    /// Seconds left; only ever set while `status` is `Cooking`.
    pub time_remaining: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub sync: SyncState,
}

impl Job {
    /// A job accepted locally and not yet confirmed by the status source.
    pub fn new_local(image_ref: impl Into<String>, style_tag: Option<String>) -> Self {
        Self {
            id: JobId::generate(),
            image_ref: image_ref.into(),
            style_tag,
            status: JobStatus::Queued,
            time_remaining: None,
            created_at: Utc::now(),
            sync: SyncState::PendingUpload,
        }
    }

    pub fn is_local_only(&self) -> bool {
        !matches!(self.sync, SyncState::Synced)
    }

    pub(crate) fn start_cooking(&mut self, duration: u32) {
        self.status = JobStatus::Cooking;
        self.time_remaining = Some(duration);
    }

    pub(crate) fn finish(&mut self) {
        self.status = JobStatus::Finished;
        self.time_remaining = None;
    }

    pub(crate) fn hold_back(&mut self) {
        self.status = JobStatus::Queued;
        self.time_remaining = None;
    }
}

/// Where an image reference points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageLocation {
    /// Directly usable URL.
    Url,
    /// Opaque storage key that needs a separate resolution step.
    StorageKey,
}

impl ImageLocation {
    pub fn of(image_ref: &str) -> Self {
        if image_ref.starts_with("http://") || image_ref.starts_with("https://") {
            ImageLocation::Url
        } else {
            ImageLocation::StorageKey
        }
    }
}
