use garde::Validate;
use serde::Deserialize;
use std::time::Duration;

use crate::kitchen::KitchenConfig;

#[derive(Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    #[garde(length(min = 1))]
    pub bind_addr: String,

    /// Base URL of the status source API
    #[garde(length(min = 1))]
    pub status_source_url: String,

    /// Bearer token for the status source, if it requires one
    #[serde(default)]
    #[garde(skip)]
    pub status_source_token: Option<String>,

    /// Request timeout for status source calls
    #[serde(default = "default_status_source_timeout_ms")]
    #[garde(range(min = 1))]
    pub status_source_timeout_ms: u64,

    /// JSON file used as local persistence when no Redis URL is set
    #[serde(default = "default_local_store_path")]
    #[garde(length(min = 1))]
    pub local_store_path: String,

    /// Redis connection string; switches local persistence to Redis
    #[serde(default)]
    #[garde(skip)]
    pub redis_url: Option<String>,

    /// Number of cooking slots
    #[serde(default = "default_max_concurrent")]
    #[garde(range(min = 1, max = 64))]
    pub max_concurrent: usize,

    /// Seconds each job cooks for
    #[serde(default = "default_cook_duration_secs")]
    #[garde(range(min = 1))]
    pub cook_duration_secs: u32,

    /// Local timer tick period
    #[serde(default = "default_tick_period_ms")]
    #[garde(range(min = 10))]
    pub tick_period_ms: u64,

    /// Status source poll period
    #[serde(default = "default_poll_period_ms")]
    #[garde(range(min = 100))]
    pub poll_period_ms: u64,

    /// How long an uploaded job may be missing from snapshots
    #[serde(default = "default_grace_period_secs")]
    #[garde(skip)]
    pub grace_period_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_status_source_timeout_ms() -> u64 {
    5000
}

fn default_local_store_path() -> String {
    "./data/jobs.json".to_string()
}

fn default_max_concurrent() -> usize {
    3
}

fn default_cook_duration_secs() -> u32 {
    3
}

fn default_tick_period_ms() -> u64 {
    1000
}

fn default_poll_period_ms() -> u64 {
    10_000
}

fn default_grace_period_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn kitchen(&self) -> KitchenConfig {
        KitchenConfig {
            max_concurrent: self.max_concurrent,
            cook_duration: self.cook_duration_secs,
            tick_period: Duration::from_millis(self.tick_period_ms),
            poll_period: Duration::from_millis(self.poll_period_ms),
            grace_period: Duration::from_secs(self.grace_period_secs),
        }
    }

    pub fn status_source_timeout(&self) -> Duration {
        Duration::from_millis(self.status_source_timeout_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] garde::Report),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<AppConfig, envy::Error> {
        envy::from_iter(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    #[test]
    fn test_defaults_fill_in() {
        let config = from_pairs(&[("STATUS_SOURCE_URL", "http://localhost:4000")]).unwrap();
        assert!(config.validate().is_ok());

        let kitchen = config.kitchen();
        assert_eq!(kitchen.max_concurrent, 3);
        assert_eq!(kitchen.cook_duration, 3);
        assert_eq!(kitchen.tick_period, Duration::from_secs(1));
        assert_eq!(kitchen.poll_period, Duration::from_secs(10));
        assert_eq!(kitchen.grace_period, Duration::from_secs(30));
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_overrides_and_validation() {
        let config = from_pairs(&[
            ("STATUS_SOURCE_URL", "http://remote"),
            ("MAX_CONCURRENT", "5"),
            ("COOK_DURATION_SECS", "20"),
            ("POLL_PERIOD_MS", "2500"),
        ])
        .unwrap();
        assert_eq!(config.kitchen().max_concurrent, 5);
        assert_eq!(config.kitchen().poll_period, Duration::from_millis(2500));

        let zero_slots = from_pairs(&[("STATUS_SOURCE_URL", "http://remote"), ("MAX_CONCURRENT", "0")]).unwrap();
        assert!(zero_slots.validate().is_err());
    }

    #[test]
    fn test_status_source_url_is_required() {
        assert!(from_pairs(&[("MAX_CONCURRENT", "2")]).is_err());
    }
}
