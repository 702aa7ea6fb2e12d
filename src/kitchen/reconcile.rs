//! Reconciliation policy between the locally ticked view and the status
//! source snapshot. Everything here is pure: same inputs, same output.

use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

use crate::models::job::{Job, JobId, JobStatus, SyncState};

/// Merge one locally advanced job with the status source's view of it.
///
/// The remote side is authoritative for status changes. While both sides
/// agree a job is cooking, the lower countdown wins so the display never
/// jumps backwards between polls.
pub fn merge_job(local: &Job, remote: &Job) -> Job {
    let mut merged = remote.clone();
    merged.sync = SyncState::Synced;

    if local.status == JobStatus::Cooking && remote.status == JobStatus::Cooking {
        merged.time_remaining = match (local.time_remaining, remote.time_remaining) {
            (Some(l), Some(r)) => Some(l.min(r)),
            (l, r) => l.or(r),
        };
    }

    merged
}

/// Whether a local job absent from the remote snapshot is still kept.
pub fn survives_absence(job: &Job, grace_period: Duration, now: Instant) -> bool {
    match job.sync {
        SyncState::Synced => false,
        SyncState::PendingUpload => true,
        SyncState::Uploaded { at } => now.saturating_duration_since(at) < grace_period,
    }
}

/// Produce the merged job set, newest first.
///
/// Jobs are matched by id. Remote jobs unknown locally are adopted as is;
/// local jobs missing from the snapshot are dropped unless they have not
/// reached the status source yet (see [`survives_absence`]).
pub fn reconcile(local: &[Job], remote: &[Job], grace_period: Duration, now: Instant) -> Vec<Job> {
    let local_by_id: HashMap<&JobId, &Job> = local.iter().map(|job| (&job.id, job)).collect();
    let remote_ids: HashSet<&JobId> = remote.iter().map(|job| &job.id).collect();

    let mut merged: Vec<Job> = remote
        .iter()
        .map(|r| match local_by_id.get(&r.id) {
            Some(l) => merge_job(l, r),
            None => r.clone(),
        })
        .collect();

    merged.extend(
        local
            .iter()
            .filter(|job| !remote_ids.contains(&job.id))
            .filter(|job| survives_absence(job, grace_period, now))
            .cloned(),
    );

    sort_newest_first(&mut merged);
    merged
}

/// Hold back the newest surplus cooking jobs so at most `max_concurrent`
/// are cooking. Returns the ids that were held back.
pub fn enforce_capacity(jobs: &mut [Job], max_concurrent: usize) -> Vec<JobId> {
    let mut cooking: Vec<usize> = jobs
        .iter()
        .enumerate()
        .filter(|(_, job)| job.status == JobStatus::Cooking)
        .map(|(idx, _)| idx)
        .collect();
    if cooking.len() <= max_concurrent {
        return Vec::new();
    }

    cooking.sort_by(|&a, &b| {
        jobs[a]
            .created_at
            .cmp(&jobs[b].created_at)
            .then_with(|| jobs[a].id.cmp(&jobs[b].id))
    });

    cooking
        .into_iter()
        .skip(max_concurrent)
        .map(|idx| {
            jobs[idx].hold_back();
            jobs[idx].id.clone()
        })
        .collect()
}

/// Default presentation order: newest `created_at` first, ties by id.
pub fn sort_newest_first(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}
