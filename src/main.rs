use axum::routing::get;
use letmecook_kitchen::{
    app_state::AppState,
    config::AppConfig,
    kitchen::KitchenService,
    routes::{self, metrics::MetricsState},
    services::{
        local_store::{FileLocalStore, LocalStore, RedisLocalStore},
        status_source::{HttpStatusSource, StatusSource},
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing letmecook-kitchen server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_gauge!("kitchen_jobs", "Jobs currently tracked, by status");
    metrics::describe_counter!("kitchen_jobs_created_total", "Jobs accepted by this kitchen");
    metrics::describe_counter!("kitchen_jobs_finished_total", "Jobs finished by the local timer");
    metrics::describe_counter!("kitchen_polls_total", "Status source polls started");
    metrics::describe_counter!("kitchen_poll_failures_total", "Status source polls that failed");
    metrics::describe_counter!(
        "kitchen_remote_entries_dropped_total",
        "Status source entries dropped as malformed or duplicate"
    );
    metrics::describe_counter!(
        "kitchen_uploads_failed_total",
        "Job uploads to the status source that failed"
    );
    metrics::describe_gauge!("kitchen_remote_offline", "1 while status source data is stale");
    metrics::describe_gauge!(
        "kitchen_remote_consecutive_failures",
        "Status source polls failed in a row"
    );

    // Initialize local persistence
    let store: Arc<dyn LocalStore> = match &config.redis_url {
        Some(redis_url) => {
            tracing::info!("Using Redis local store");
            Arc::new(RedisLocalStore::new(redis_url).expect("Failed to initialize Redis local store"))
        }
        None => {
            tracing::info!(path = %config.local_store_path, "Using file local store");
            Arc::new(FileLocalStore::new(&config.local_store_path))
        }
    };

    // Initialize status source client
    tracing::info!(url = %config.status_source_url, "Initializing status source client");
    let source: Arc<dyn StatusSource> = Arc::new(
        HttpStatusSource::new(
            &config.status_source_url,
            config.status_source_token.clone(),
            config.status_source_timeout(),
        )
        .expect("Failed to initialize status source client"),
    );

    // Start the kitchen
    let kitchen = KitchenService::start(config.kitchen(), source, store.clone()).await;
    let state = AppState::new(kitchen, store);
    let metrics_state = MetricsState {
        handle: prometheus_handle,
        kitchen: state.kitchen.clone(),
    };
    let kitchen = state.kitchen.clone();

    // Build API routes
    let app = routes::api_router(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(metrics_state),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(64 * 1024));

    tracing::info!("Starting letmecook-kitchen on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .expect("Server error");

    kitchen.shutdown().await;
}
