//! Local timer engine.
//!
//! Advances cooking countdowns one step per tick and moves queued jobs into
//! free cooking slots. Never touches the network.

use crate::kitchen::KitchenConfig;
use crate::models::job::{Job, JobStatus};

/// Result of a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub promoted: usize,
    pub finished: usize,
    pub advanced: usize,
}

impl TickOutcome {
    /// Whether the tick changed any job. Unchanged ticks must not be published.
    pub fn changed(&self) -> bool {
        self.promoted > 0 || self.finished > 0 || self.advanced > 0
    }
}

/// Run one tick over `jobs`.
///
/// Slots are filled first so that jobs waiting at the tick boundary start
/// counting down immediately. Jobs promoted into slots freed during this
/// tick keep the full cook duration until the next one.
pub fn tick(jobs: &mut [Job], config: &KitchenConfig) -> TickOutcome {
    let mut outcome = TickOutcome {
        promoted: fill_free_slots(jobs, config),
        ..TickOutcome::default()
    };

    for job in jobs.iter_mut() {
        if job.status != JobStatus::Cooking {
            continue;
        }
        if let Some(remaining) = job.time_remaining.filter(|t| *t > 0) {
            outcome.advanced += 1;
            if remaining == 1 {
                job.finish();
                outcome.finished += 1;
            } else {
                job.time_remaining = Some(remaining - 1);
            }
        }
    }

    if outcome.finished > 0 {
        outcome.promoted += fill_free_slots(jobs, config);
    }

    outcome
}

/// Promote queued jobs, oldest first, until `max_concurrent` are cooking.
/// Returns the number of promoted jobs.
pub fn fill_free_slots(jobs: &mut [Job], config: &KitchenConfig) -> usize {
    let cooking = count_cooking(jobs);
    let free = config.max_concurrent.saturating_sub(cooking);
    if free == 0 {
        return 0;
    }

    let mut candidates: Vec<usize> = jobs
        .iter()
        .enumerate()
        .filter(|(_, job)| job.status == JobStatus::Queued)
        .map(|(idx, _)| idx)
        .collect();
    candidates.sort_by(|&a, &b| {
        jobs[a]
            .created_at
            .cmp(&jobs[b].created_at)
            .then_with(|| jobs[a].id.cmp(&jobs[b].id))
    });

    let promoted = candidates.len().min(free);
    for idx in candidates.into_iter().take(promoted) {
        jobs[idx].start_cooking(config.cook_duration);
    }
    promoted
}

pub fn count_cooking(jobs: &[Job]) -> usize {
    jobs.iter().filter(|job| job.status == JobStatus::Cooking).count()
}
