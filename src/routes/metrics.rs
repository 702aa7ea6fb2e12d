use axum::extract::State;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::kitchen::{KitchenService, RemoteFreshness};

#[derive(Clone)]
pub struct MetricsState {
    pub handle: Arc<PrometheusHandle>,
    pub kitchen: Arc<KitchenService>,
}

/// GET /metrics: Prometheus text exposition.
///
/// Status source freshness is sampled at scrape time.
pub async fn prometheus_metrics(State(state): State<MetricsState>) -> String {
    let remote = state.kitchen.view().remote;
    let failures = match remote {
        RemoteFreshness::Stale { consecutive_failures } => consecutive_failures,
        _ => 0,
    };
    metrics::gauge!("kitchen_remote_offline").set(if remote.is_offline() { 1.0 } else { 0.0 });
    metrics::gauge!("kitchen_remote_consecutive_failures").set(failures as f64);

    state.handle.render()
}
