//! In-memory remote kitchen speaking the status source API.
//!
//! Cooks its own jobs with the same timer engine and slot limit, so a local
//! kitchen pointed at it sees realistic, independently clocked progress.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::kitchen::reconcile::sort_newest_first;
use crate::kitchen::{timer, KitchenConfig};
use crate::models::job::{Job, JobId, JobStatus, SyncState};
use crate::models::remote::RemoteRecord;

#[derive(Clone)]
pub struct Simulator {
    jobs: Arc<Mutex<Vec<Job>>>,
    config: KitchenConfig,
}

impl Simulator {
    pub fn new(config: KitchenConfig) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Vec::new())),
            config,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/jobs", get(list_jobs).post(create_job))
            .route("/jobs/{id}", delete(delete_job))
            .with_state(self.clone())
    }

    /// Advance the remote kitchen until `cancel` fires.
    pub async fn run_clock(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_period);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Simulator clock stopping");
                    break;
                }
                _ = interval.tick() => {
                    let mut jobs = self.jobs.lock().await;
                    let outcome = timer::tick(&mut jobs, &self.config);
                    if outcome.changed() {
                        tracing::debug!(
                            promoted = outcome.promoted,
                            finished = outcome.finished,
                            "Simulator tick"
                        );
                    }
                }
            }
        }
    }

    pub async fn records(&self) -> Vec<RemoteRecord> {
        self.jobs.lock().await.iter().map(RemoteRecord::from).collect()
    }
}

async fn list_jobs(State(sim): State<Simulator>) -> Json<Vec<RemoteRecord>> {
    Json(sim.records().await)
}

async fn create_job(
    State(sim): State<Simulator>,
    Json(record): Json<RemoteRecord>,
) -> Result<(StatusCode, Json<RemoteRecord>), StatusCode> {
    let mut job = record.into_job().map_err(|e| {
        tracing::warn!(error = %e, "Rejecting malformed job");
        StatusCode::UNPROCESSABLE_ENTITY
    })?;
    job.status = JobStatus::Queued;
    job.time_remaining = None;
    job.sync = SyncState::Synced;

    let mut jobs = sim.jobs.lock().await;
    if jobs.iter().any(|j| j.id == job.id) {
        return Err(StatusCode::CONFLICT);
    }

    tracing::info!(job_id = %job.id, "Simulator accepted job");
    let created = RemoteRecord::from(&job);
    jobs.push(job);
    sort_newest_first(&mut jobs);
    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_job(State(sim): State<Simulator>, Path(id): Path<String>) -> StatusCode {
    let id = JobId::new(id);
    let mut jobs = sim.jobs.lock().await;
    let before = jobs.len();
    jobs.retain(|j| j.id != id);
    if jobs.len() == before {
        StatusCode::NOT_FOUND
    } else {
        tracing::info!(job_id = %id, "Simulator deleted job");
        StatusCode::NO_CONTENT
    }
}
