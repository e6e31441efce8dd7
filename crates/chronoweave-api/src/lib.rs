//! Chronoweave API — HTTP surface of the simulation orchestrator.
//!
//! Starting a run answers with its progress as server-sent events; runs are
//! steered through the control endpoint while the stream is open.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod stream;
pub mod telemetry;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the full application router.
pub fn build_router(state: AppState) -> Router {
    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    Router::new()
        .merge(routes::health::router())
        .nest(
            "/api/v1/simulations",
            routes::simulation::router().merge(routes::control::router()),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
