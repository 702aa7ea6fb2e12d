use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;
use crate::kitchen::{RemoteFreshness, StatusCounts};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub offline: bool,
    pub checks: HealthChecks,
    pub jobs: StatusCounts,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub local_store: ComponentHealth,
    pub status_source: RemoteFreshness,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

/// GET /health: local store reachability and status source freshness.
///
/// A stale status source only degrades the report; the kitchen keeps
/// serving the last known jobs, so the endpoint stays 200.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();

    let store_check = match state.store.health_check().await {
        Ok(()) => ComponentHealth {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Local store health check failed");
            ComponentHealth {
                status: "error".to_string(),
                latency_ms: None,
            }
        }
    };

    let view = state.kitchen.view();
    let store_ok = store_check.status == "ok";
    let offline = view.remote.is_offline();

    let status_code = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if store_ok && !offline {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        offline,
        checks: HealthChecks {
            local_store: store_check,
            status_source: view.remote,
        },
        jobs: view.counts,
    };

    (status_code, Json(response))
}
