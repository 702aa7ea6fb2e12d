use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;

use crate::kitchen::reconcile::{enforce_capacity, reconcile, sort_newest_first};
use crate::kitchen::timer::{self, TickOutcome};
use crate::kitchen::KitchenConfig;
use crate::models::job::{Job, JobId, JobStatus, SyncState};
use crate::models::remote::RemoteRecord;

/// How current the status source data is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RemoteFreshness {
    /// No poll has completed yet.
    #[default]
    Unknown,
    Fresh,
    /// The last poll(s) failed; jobs reflect the last good snapshot.
    Stale { consecutive_failures: u32 },
}

impl RemoteFreshness {
    pub fn is_offline(&self) -> bool {
        !matches!(self, RemoteFreshness::Fresh)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub cooking: usize,
    pub finished: usize,
}

impl StatusCounts {
    fn of(jobs: &[Job]) -> Self {
        jobs.iter().fold(Self::default(), |mut counts, job| {
            match job.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Cooking => counts.cooking += 1,
                JobStatus::Finished => counts.finished += 1,
            }
            counts
        })
    }
}

/// Jobs grouped by status, borrowing from a [`KitchenView`].
#[derive(Debug, Default)]
pub struct StatusGroups<'a> {
    pub queued: Vec<&'a Job>,
    pub cooking: Vec<&'a Job>,
    pub finished: Vec<&'a Job>,
}

/// Immutable snapshot of the merged job set handed to the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct KitchenView {
    pub jobs: Arc<Vec<Job>>,
    pub counts: StatusCounts,
    pub remote: RemoteFreshness,
    pub revision: u64,
}

impl KitchenView {
    pub fn with_status(&self, status: JobStatus) -> impl Iterator<Item = &Job> + '_ {
        self.jobs.iter().filter(move |job| job.status == status)
    }

    /// Stable partition by status; each group keeps the view order.
    pub fn partition(&self) -> StatusGroups<'_> {
        self.jobs.iter().fold(StatusGroups::default(), |mut groups, job| {
            match job.status {
                JobStatus::Queued => groups.queued.push(job),
                JobStatus::Cooking => groups.cooking.push(job),
                JobStatus::Finished => groups.finished.push(job),
            }
            groups
        })
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| &job.id == id)
    }
}

/// Owned kitchen state. Only the kitchen actor mutates it; every mutating
/// method returns whether the published view must change.
pub struct KitchenState {
    config: KitchenConfig,
    jobs: Vec<Job>,
    remote: RemoteFreshness,
    tombstones: HashSet<JobId>,
    applied_generation: u64,
    revision: u64,
}

impl KitchenState {
    pub fn new(config: KitchenConfig, seed: Vec<Job>) -> Self {
        let mut jobs = seed;
        sort_newest_first(&mut jobs);
        enforce_capacity(&mut jobs, config.max_concurrent);
        Self {
            config,
            jobs,
            remote: RemoteFreshness::Unknown,
            tombstones: HashSet::new(),
            applied_generation: 0,
            revision: 0,
        }
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn remote(&self) -> RemoteFreshness {
        self.remote
    }

    /// Advance local timers by one tick.
    pub fn tick(&mut self) -> TickOutcome {
        let outcome = timer::tick(&mut self.jobs, &self.config);
        if outcome.changed() {
            self.revision += 1;
            tracing::trace!(
                promoted = outcome.promoted,
                finished = outcome.finished,
                advanced = outcome.advanced,
                "Kitchen tick"
            );
        }
        outcome
    }

    /// Merge a successful poll. Results older than the last applied poll are ignored.
    pub fn apply_snapshot(&mut self, generation: u64, records: Vec<RemoteRecord>, now: Instant) -> bool {
        if generation <= self.applied_generation {
            tracing::debug!(generation, applied = self.applied_generation, "Discarding out-of-date snapshot");
            return false;
        }
        self.applied_generation = generation;

        // Once the source stops listing a deleted id, no later snapshot can bring it back.
        let listed: HashSet<JobId> = records
            .iter()
            .filter_map(|r| r.id.as_deref())
            .map(JobId::from)
            .collect();
        let remote = self.ingest(records);
        self.tombstones.retain(|id| listed.contains(id));
        let mut merged = reconcile(&self.jobs, &remote, self.config.grace_period, now);
        for id in enforce_capacity(&mut merged, self.config.max_concurrent) {
            tracing::warn!(job_id = %id, "Status source reports more cooking jobs than slots, holding job back");
        }

        for job in self.jobs.iter().filter(|job| !merged.iter().any(|m| m.id == job.id)) {
            tracing::info!(job_id = %job.id, "Job no longer reported by status source, removing");
        }

        let changed = merged != self.jobs || self.remote != RemoteFreshness::Fresh;
        self.jobs = merged;
        self.remote = RemoteFreshness::Fresh;
        if changed {
            self.revision += 1;
        }
        changed
    }

    /// Record a failed poll. Jobs keep their last merged state.
    pub fn mark_unavailable(&mut self, generation: u64) -> bool {
        if generation <= self.applied_generation {
            return false;
        }
        self.applied_generation = generation;

        let failures = match self.remote {
            RemoteFreshness::Stale { consecutive_failures } => consecutive_failures + 1,
            _ => 1,
        };
        self.remote = RemoteFreshness::Stale {
            consecutive_failures: failures,
        };
        self.revision += 1;
        true
    }

    /// Track a job that was just accepted locally.
    pub fn insert(&mut self, job: Job) -> bool {
        if self.tombstones.contains(&job.id) || self.jobs.iter().any(|j| j.id == job.id) {
            tracing::warn!(job_id = %job.id, "Ignoring job with an id already in use");
            return false;
        }
        self.jobs.push(job);
        sort_newest_first(&mut self.jobs);
        self.revision += 1;
        true
    }

    /// The status source accepted a locally created job.
    pub fn confirm_upload(&mut self, id: &JobId, now: Instant) -> bool {
        match self.jobs.iter_mut().find(|job| &job.id == id) {
            Some(job) if job.sync == SyncState::PendingUpload => {
                job.sync = SyncState::Uploaded { at: now };
                self.revision += 1;
                true
            }
            _ => false,
        }
    }

    /// Drop a deleted job and make sure later snapshots cannot bring it back.
    pub fn remove(&mut self, id: &JobId) -> bool {
        self.tombstones.insert(id.clone());
        let before = self.jobs.len();
        self.jobs.retain(|job| &job.id != id);
        let removed = self.jobs.len() != before;
        if removed {
            self.revision += 1;
        }
        removed
    }

    pub fn view(&self) -> KitchenView {
        KitchenView {
            jobs: Arc::new(self.jobs.clone()),
            counts: StatusCounts::of(&self.jobs),
            remote: self.remote,
            revision: self.revision,
        }
    }

    /// Validate snapshot entries, dropping bad, duplicate and deleted ones individually.
    fn ingest(&self, records: Vec<RemoteRecord>) -> Vec<Job> {
        let mut seen = HashSet::new();
        let mut jobs = Vec::with_capacity(records.len());

        for record in records {
            let job = match record.into_job() {
                Ok(job) => job,
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping malformed status source entry");
                    metrics::counter!("kitchen_remote_entries_dropped_total", "reason" => "malformed")
                        .increment(1);
                    continue;
                }
            };
            if self.tombstones.contains(&job.id) {
                tracing::debug!(job_id = %job.id, "Ignoring entry for deleted job");
                continue;
            }
            if !seen.insert(job.id.clone()) {
                tracing::warn!(job_id = %job.id, "Dropping duplicate status source entry");
                metrics::counter!("kitchen_remote_entries_dropped_total", "reason" => "duplicate")
                    .increment(1);
                continue;
            }
            jobs.push(job);
        }

        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> KitchenConfig {
        KitchenConfig {
            max_concurrent: 3,
            cook_duration: 3,
            grace_period: Duration::from_secs(30),
            ..KitchenConfig::default()
        }
    }

    fn record(id: &str, timestamp: i64, status: &str, time_remaining: Option<i64>) -> RemoteRecord {
        RemoteRecord {
            id: Some(id.to_string()),
            uri: Some(format!("images/{id}.jpg")),
            timestamp: Some(timestamp),
            status: Some(status.to_string()),
            style: None,
            time_remaining,
        }
    }

    #[test]
    fn test_snapshot_then_ticks_keep_invariants() {
        let mut state = KitchenState::new(config(), Vec::new());
        let records = (1..=5).map(|i| record(&format!("j{i}"), i * 100, "queued", Some(0))).collect();

        assert!(state.apply_snapshot(1, records, Instant::now()));
        for _ in 0..3 {
            assert!(state.tick().changed());
        }

        let view = state.view();
        assert_eq!(view.counts, StatusCounts { queued: 0, cooking: 2, finished: 3 });
        assert!(view.with_status(JobStatus::Cooking).all(|j| j.time_remaining == Some(3)));
        assert_eq!(view.remote, RemoteFreshness::Fresh);
    }

    #[test]
    fn test_bad_entries_do_not_abort_snapshot() {
        let mut state = KitchenState::new(config(), Vec::new());
        let records = vec![
            record("good", 1, "finished", None),
            RemoteRecord {
                id: None,
                ..record("x", 2, "queued", None)
            },
            record("weird", 3, "exploded", None),
            record("good", 4, "queued", None),
            record("also-good", 5, "cooking", Some(4)),
        ];

        state.apply_snapshot(1, records, Instant::now());

        let ids: Vec<&str> = state.jobs().iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, ["also-good", "good"]);
        assert_eq!(state.jobs()[1].status, JobStatus::Finished);
    }

    #[test]
    fn test_failures_keep_last_known_jobs() {
        let mut state = KitchenState::new(config(), Vec::new());
        state.apply_snapshot(1, vec![record("a", 1, "cooking", Some(5))], Instant::now());
        state.tick();

        assert!(state.mark_unavailable(2));
        assert!(state.mark_unavailable(3));

        assert_eq!(
            state.remote(),
            RemoteFreshness::Stale {
                consecutive_failures: 2
            }
        );
        assert_eq!(state.jobs().len(), 1);
        assert_eq!(state.jobs()[0].time_remaining, Some(4));

        state.apply_snapshot(4, vec![record("a", 1, "cooking", Some(6))], Instant::now());
        assert_eq!(state.remote(), RemoteFreshness::Fresh);
        assert_eq!(state.jobs()[0].time_remaining, Some(4));
    }

    #[test]
    fn test_out_of_date_snapshot_is_discarded() {
        let mut state = KitchenState::new(config(), Vec::new());
        state.apply_snapshot(2, vec![record("new", 2, "queued", None)], Instant::now());

        assert!(!state.apply_snapshot(1, vec![record("old", 1, "queued", None)], Instant::now()));
        assert!(!state.mark_unavailable(2));
        assert_eq!(state.jobs()[0].id.as_str(), "new");
    }

    #[test]
    fn test_unchanged_snapshot_is_not_published() {
        let mut state = KitchenState::new(config(), Vec::new());
        let records = vec![record("a", 1, "finished", None)];

        assert!(state.apply_snapshot(1, records.clone(), Instant::now()));
        let revision = state.view().revision;
        assert!(!state.apply_snapshot(2, records, Instant::now()));
        assert_eq!(state.view().revision, revision);
    }

    #[test]
    fn test_removed_job_is_not_resurrected() {
        let mut state = KitchenState::new(config(), Vec::new());
        state.apply_snapshot(1, vec![record("a", 1, "finished", None)], Instant::now());

        assert!(state.remove(&JobId::from("a")));
        state.apply_snapshot(2, vec![record("a", 1, "finished", None)], Instant::now());

        assert!(state.jobs().is_empty());
    }

    #[test]
    fn test_tombstone_released_once_source_forgets_job() {
        let mut state = KitchenState::new(config(), Vec::new());
        state.apply_snapshot(1, vec![record("a", 1, "finished", None)], Instant::now());
        state.remove(&JobId::from("a"));

        state.apply_snapshot(2, vec![record("a", 1, "finished", None)], Instant::now());
        assert!(state.tombstones.contains(&JobId::from("a")));

        state.apply_snapshot(3, vec![record("b", 2, "queued", None)], Instant::now());
        assert!(state.tombstones.is_empty());
    }

    #[test]
    fn test_uploaded_job_waits_for_grace_period() {
        let start = Instant::now();
        let mut state = KitchenState::new(config(), Vec::new());
        let job = Job::new_local("file:///a.jpg", None);
        let id = job.id.clone();

        assert!(state.insert(job));
        assert!(state.confirm_upload(&id, start));
        assert!(!state.confirm_upload(&id, start));

        state.apply_snapshot(1, Vec::new(), start + Duration::from_secs(10));
        assert_eq!(state.jobs().len(), 1);

        state.apply_snapshot(2, Vec::new(), start + Duration::from_secs(31));
        assert!(state.jobs().is_empty());
    }

    #[test]
    fn test_seed_respects_capacity() {
        let seed: Vec<Job> = (0..5)
            .map(|i| {
                let mut job = record(&format!("s{i}"), i, "cooking", Some(2)).into_job().unwrap();
                job.sync = SyncState::PendingUpload;
                job
            })
            .collect();

        let state = KitchenState::new(config(), seed);

        assert_eq!(state.view().counts.cooking, 3);
    }

    #[test]
    fn test_partition_keeps_order() {
        let mut state = KitchenState::new(config(), Vec::new());
        state.apply_snapshot(
            1,
            vec![
                record("f1", 10, "finished", None),
                record("q1", 20, "queued", None),
                record("f2", 30, "finished", None),
            ],
            Instant::now(),
        );

        let view = state.view();
        let groups = view.partition();

        let finished: Vec<&str> = groups.finished.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(finished, ["f2", "f1"]);
        assert_eq!(groups.queued.len(), 1);
        assert!(groups.cooking.is_empty());
        assert_eq!(view.with_status(JobStatus::Finished).count(), 2);
    }
}
