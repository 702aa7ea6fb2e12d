use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A job that runs every `period` on its own task until stopped.
///
/// A run is never started while the previous one is still in flight; missed
/// periods are skipped and extra [`trigger`](Self::trigger) calls coalesce.
/// Stopping drops an in-flight run, so its effects are never applied.
pub struct PeriodicTask {
    name: &'static str,
    cancel: CancellationToken,
    trigger: Arc<Notify>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(
        tracker: &TaskTracker,
        name: &'static str,
        period: Duration,
        run_immediately: bool,
        cancel: CancellationToken,
        mut job: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let trigger = Arc::new(Notify::new());
        let task_trigger = trigger.clone();
        let task_cancel = cancel.clone();

        tracker.spawn(async move {
            let start = if run_immediately {
                Instant::now()
            } else {
                Instant::now() + period
            };
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::debug!(task = name, period_ms = period.as_millis() as u64, "Periodic task started");

            loop {
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    _ = interval.tick() => {}
                    _ = task_trigger.notified() => {}
                }

                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => {
                        tracing::debug!(task = name, "Dropping in-flight run on stop");
                        break;
                    }
                    _ = job() => {}
                }
            }

            tracing::debug!(task = name, "Periodic task stopped");
        });

        Self {
            name,
            cancel,
            trigger,
        }
    }

    /// Run as soon as the current run (if any) completes.
    pub fn trigger(&self) {
        tracing::trace!(task = self.name, "Periodic task triggered");
        self.trigger.notify_one();
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    #[cfg(test)]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
