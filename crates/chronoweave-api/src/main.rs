//! Chronoweave API server entry point.

use std::error::Error;
use std::sync::{Arc, Mutex};

use chronoweave_api::config::AppConfig;
use chronoweave_api::state::{AppState, RunLimits};
use chronoweave_api::{build_router, telemetry};
use chronoweave_core::clock::{Clock, SystemClock};
use chronoweave_core::rng::{DeterministicRng, SystemRng};
use chronoweave_generator::HttpNarrativeGenerator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Read configuration from environment.
    let config = AppConfig::from_env()?;

    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;
    tracing::info!("Starting Chronoweave API server");

    // Build application state.
    let generator = Arc::new(HttpNarrativeGenerator::new(config.generator.clone())?);
    tracing::info!(endpoint = %generator.endpoint(), "narrative generator configured");
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(SystemClock);
    let rng: Arc<Mutex<dyn DeterministicRng + Send>> = Arc::new(Mutex::new(SystemRng::from_os_rng()));
    let app_state = AppState::new(
        generator,
        clock,
        rng,
        config.engine,
        RunLimits {
            stream_buffer: config.stream_buffer,
            run_history_limit: config.run_history_limit,
        },
    );

    // Build router.
    let app = build_router(app_state);

    // Start server.
    let addr = config.socket_addr()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    telemetry.shutdown();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
