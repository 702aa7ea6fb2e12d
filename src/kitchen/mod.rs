//! The kitchen: a bounded set of cooking slots whose local countdowns are
//! reconciled against the status source.

pub mod periodic;
pub mod reconcile;
pub mod runtime;
pub mod state;
pub mod timer;

use std::time::Duration;

pub use runtime::{KitchenError, KitchenService};
pub use state::{KitchenView, RemoteFreshness, StatusCounts, StatusGroups};

/// Tuning constants for the kitchen.
#[derive(Debug, Clone)]
pub struct KitchenConfig {
    /// Number of cooking slots.
    pub max_concurrent: usize,
    /// Seconds a promoted job cooks for.
    pub cook_duration: u32,
    /// Period of the local timer tick.
    pub tick_period: Duration,
    /// Period of the status source poll.
    pub poll_period: Duration,
    /// How long an uploaded job may be missing from snapshots before it is dropped.
    pub grace_period: Duration,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            cook_duration: 3,
            tick_period: Duration::from_secs(1),
            poll_period: Duration::from_secs(10),
            grace_period: Duration::from_secs(30),
        }
    }
}
