use letmecook_kitchen::{config::AppConfig, kitchen::KitchenConfig, simulator::Simulator};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4000";

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting remote kitchen simulator");

    dotenvy::dotenv().ok();
    let bind_addr =
        std::env::var("SIMULATOR_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

    // Cook with the same limits as the client when they are configured, otherwise defaults.
    let config = match AppConfig::from_env() {
        Ok(app) => app.kitchen(),
        Err(e) => {
            tracing::info!(reason = %e, "Using default kitchen limits");
            KitchenConfig::default()
        }
    };

    tracing::info!(
        max_concurrent = config.max_concurrent,
        cook_duration = config.cook_duration,
        "Simulator kitchen configured"
    );

    let simulator = Simulator::new(config);
    let cancel = CancellationToken::new();

    let clock = {
        let simulator = simulator.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { simulator.run_clock(cancel).await })
    };

    let app = simulator.router().layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Simulator listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .expect("Server error");

    cancel.cancel();
    if let Err(e) = clock.await {
        tracing::error!(error = %e, "Simulator clock task failed");
    }
}
