pub mod health;
pub mod jobs;
pub mod metrics;
pub mod styles;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::app_state::AppState;

/// Health and API routes, without middleware or the metrics endpoint.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/jobs", get(jobs::list_jobs).post(jobs::create_job))
        .route("/api/v1/jobs/refresh", post(jobs::refresh))
        .route("/api/v1/jobs/{id}", delete(jobs::delete_job))
        .route("/api/v1/styles", get(styles::list_styles))
        .with_state(state)
}
