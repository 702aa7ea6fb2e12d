//! Let Me Cook kitchen
//!
//! This library tracks photo-styling jobs through a bounded set of cooking
//! slots, ticks their countdowns locally and reconciles them against a
//! remote status source that stays authoritative for job existence and
//! status.

pub mod app_state;
pub mod config;
pub mod kitchen;
pub mod models;
pub mod routes;
pub mod services;
pub mod simulator;
