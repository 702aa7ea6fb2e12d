//! Runs the kitchen: one actor task owns [`KitchenState`] and applies every
//! mutation in order, while a ticker and a poller feed it commands.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::kitchen::periodic::PeriodicTask;
use crate::kitchen::state::{KitchenState, KitchenView, StatusCounts};
use crate::kitchen::KitchenConfig;
use crate::models::job::{Job, JobId, JobStatus, SyncState};
use crate::models::remote::RemoteRecord;
use crate::services::local_store::{LocalStore, StoreError, StoredJob};
use crate::services::status_source::{SourceError, StatusSource};

const COMMAND_BUFFER: usize = 64;

enum Command {
    Tick,
    Snapshot {
        generation: u64,
        result: Result<Vec<RemoteRecord>, SourceError>,
    },
    Insert(Job),
    UploadConfirmed(JobId),
    Remove(JobId),
}

/// Handle to a running kitchen.
pub struct KitchenService {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<KitchenView>,
    source: Arc<dyn StatusSource>,
    store: Arc<dyn LocalStore>,
    uploader: Arc<Uploader>,
    ticker: PeriodicTask,
    poller: PeriodicTask,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl KitchenService {
    /// Restore persisted jobs and start the actor, ticker and poller.
    pub async fn start(
        config: KitchenConfig,
        source: Arc<dyn StatusSource>,
        store: Arc<dyn LocalStore>,
    ) -> Self {
        let seed: Vec<Job> = match store.list().await {
            Ok(stored) => stored.into_iter().map(StoredJob::into_job).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Local store unreadable, starting without restored jobs");
                Vec::new()
            }
        };

        tracing::info!(
            restored = seed.len(),
            max_concurrent = config.max_concurrent,
            cook_duration = config.cook_duration,
            tick_period_ms = config.tick_period.as_millis() as u64,
            poll_period_ms = config.poll_period.as_millis() as u64,
            "Starting kitchen"
        );

        let state = KitchenState::new(config.clone(), seed);
        let initial = state.view();
        record_gauges(&initial.counts);
        let (view_tx, view_rx) = watch::channel(initial);
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        tracker.spawn(run_actor(state, cmd_rx, view_tx, cancel.clone()));

        let tick_tx = cmd_tx.clone();
        let ticker = PeriodicTask::spawn(
            &tracker,
            "tick",
            config.tick_period,
            false,
            cancel.child_token(),
            move || {
                let tx = tick_tx.clone();
                async move {
                    let _ = tx.send(Command::Tick).await;
                }
            },
        );

        let uploader = Arc::new(Uploader {
            source: source.clone(),
            store: store.clone(),
            commands: cmd_tx.clone(),
            in_flight: Mutex::new(HashSet::new()),
        });
        let poll = Poll {
            source: source.clone(),
            uploader: uploader.clone(),
            commands: cmd_tx.clone(),
            view: view_rx.clone(),
            generation: Arc::new(AtomicU64::new(0)),
        };
        let poller = PeriodicTask::spawn(
            &tracker,
            "poll",
            config.poll_period,
            true,
            cancel.child_token(),
            move || poll.clone().run(),
        );

        Self {
            commands: cmd_tx,
            view: view_rx,
            source,
            store,
            uploader,
            ticker,
            poller,
            cancel,
            tracker,
        }
    }

    /// Current merged view.
    pub fn view(&self) -> KitchenView {
        self.view.borrow().clone()
    }

    /// Receiver notified only when the merged view changes.
    pub fn subscribe(&self) -> watch::Receiver<KitchenView> {
        self.view.clone()
    }

    /// Poll the status source as soon as possible. Coalesces with a poll in flight.
    pub fn refresh(&self) {
        self.poller.trigger();
    }

    /// Accept a new job. It is tracked locally even if the upload fails.
    pub async fn create_job(&self, image_ref: String, style_tag: Option<String>) -> Result<Job, KitchenError> {
        if !self.is_running() {
            return Err(KitchenError::Closed);
        }

        let mut job = Job::new_local(image_ref, style_tag);
        self.store.create(&StoredJob::from_job(&job, false)).await?;
        if let Err(e) = self.send(Command::Insert(job.clone())).await {
            // A rejected job must not be restored on the next start.
            if let Err(store_err) = self.store.delete(&job.id).await {
                tracing::warn!(job_id = %job.id, error = %store_err, "Failed to roll back stored job");
            }
            return Err(e);
        }
        metrics::counter!("kitchen_jobs_created_total").increment(1);

        tracing::info!(job_id = %job.id, style = ?job.style_tag, "Job accepted");

        if self.uploader.upload(&job).await == UploadOutcome::Uploaded {
            job.sync = SyncState::Uploaded { at: Instant::now() };
        }
        Ok(job)
    }

    /// Delete a job remotely, then locally. A remote failure leaves local state untouched.
    pub async fn delete_job(&self, id: &JobId) -> Result<(), KitchenError> {
        let sync = self
            .view
            .borrow()
            .get(id)
            .map(|job| job.sync)
            .ok_or_else(|| KitchenError::UnknownJob(id.clone()))?;

        if sync != SyncState::PendingUpload {
            self.source.delete_job(id).await?;
        }
        if let Err(e) = self.store.delete(id).await {
            tracing::warn!(job_id = %id, error = %e, "Failed to remove job from local store");
        }
        self.send(Command::Remove(id.clone())).await?;

        tracing::info!(job_id = %id, "Job deleted");
        Ok(())
    }

    /// Stop ticking and polling. A poll still in flight is discarded.
    pub async fn shutdown(&self) {
        self.ticker.stop();
        self.poller.stop();
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("Kitchen stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    async fn send(&self, command: Command) -> Result<(), KitchenError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| KitchenError::Closed)
    }
}

async fn run_actor(
    mut state: KitchenState,
    mut commands: mpsc::Receiver<Command>,
    view: watch::Sender<KitchenView>,
    cancel: CancellationToken,
) {
    loop {
        let command = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        let changed = match command {
            Command::Tick => {
                let outcome = state.tick();
                if outcome.finished > 0 {
                    metrics::counter!("kitchen_jobs_finished_total").increment(outcome.finished as u64);
                }
                outcome.changed()
            }
            Command::Snapshot {
                generation,
                result: Ok(records),
            } => state.apply_snapshot(generation, records, Instant::now()),
            Command::Snapshot {
                generation,
                result: Err(e),
            } => {
                tracing::warn!(error = %e, generation, "Status source unavailable, keeping last known jobs");
                metrics::counter!("kitchen_poll_failures_total").increment(1);
                state.mark_unavailable(generation)
            }
            Command::Insert(job) => state.insert(job),
            Command::UploadConfirmed(id) => state.confirm_upload(&id, Instant::now()),
            Command::Remove(id) => state.remove(&id),
        };

        if changed {
            let next = state.view();
            record_gauges(&next.counts);
            view.send_replace(next);
        }
    }

    tracing::debug!("Kitchen actor stopped");
}

fn record_gauges(counts: &StatusCounts) {
    for (status, count) in [
        (JobStatus::Queued, counts.queued),
        (JobStatus::Cooking, counts.cooking),
        (JobStatus::Finished, counts.finished),
    ] {
        let label: &'static str = status.into();
        metrics::gauge!("kitchen_jobs", "status" => label).set(count as f64);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadOutcome {
    Uploaded,
    Failed,
    AlreadyInFlight,
}

/// Sends locally created jobs to the status source, one attempt per job at a time.
struct Uploader {
    source: Arc<dyn StatusSource>,
    store: Arc<dyn LocalStore>,
    commands: mpsc::Sender<Command>,
    in_flight: Mutex<HashSet<JobId>>,
}

impl Uploader {
    async fn upload(&self, job: &Job) -> UploadOutcome {
        let Some(_claim) = self.claim(&job.id) else {
            return UploadOutcome::AlreadyInFlight;
        };

        let record = RemoteRecord {
            status: Some(JobStatus::Queued.to_string()),
            time_remaining: None,
            ..RemoteRecord::from(job)
        };

        match self.source.create_job(&record).await {
            Ok(created) => {
                tracing::info!(job_id = %job.id, remote_status = ?created.status, "Job uploaded to status source");
                if let Err(e) = self.store.create(&StoredJob::from_job(job, true)).await {
                    tracing::warn!(job_id = %job.id, error = %e, "Failed to persist upload confirmation");
                }
                let _ = self.commands.send(Command::UploadConfirmed(job.id.clone())).await;
                UploadOutcome::Uploaded
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Upload failed, keeping job local until next sync");
                metrics::counter!("kitchen_uploads_failed_total").increment(1);
                UploadOutcome::Failed
            }
        }
    }

    /// Reserve `id` for one upload attempt. The reservation ends when the
    /// returned claim is dropped, including when the upload future is.
    fn claim(&self, id: &JobId) -> Option<UploadClaim<'_>> {
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone());
        inserted.then(|| UploadClaim {
            in_flight: &self.in_flight,
            id: id.clone(),
        })
    }
}

struct UploadClaim<'a> {
    in_flight: &'a Mutex<HashSet<JobId>>,
    id: JobId,
}

impl Drop for UploadClaim<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// One sync cycle: retry pending uploads, then fetch and hand over the snapshot.
#[derive(Clone)]
struct Poll {
    source: Arc<dyn StatusSource>,
    uploader: Arc<Uploader>,
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<KitchenView>,
    generation: Arc<AtomicU64>,
}

impl Poll {
    async fn run(self) {
        let pending: Vec<Job> = self
            .view
            .borrow()
            .jobs
            .iter()
            .filter(|job| job.sync == SyncState::PendingUpload)
            .cloned()
            .collect();
        for job in &pending {
            self.uploader.upload(job).await;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::counter!("kitchen_polls_total").increment(1);
        let result = self.source.list_jobs().await;
        if let Ok(records) = &result {
            tracing::debug!(generation, entries = records.len(), "Polled status source");
        }

        let _ = self.commands.send(Command::Snapshot { generation, result }).await;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KitchenError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("local store error: {0}")]
    Store(#[from] StoreError),

    #[error("unknown job {0}")]
    UnknownJob(JobId),

    #[error("kitchen is shut down")]
    Closed,
}
