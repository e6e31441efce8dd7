//! Routes for starting runs and querying sessions and finalized runs.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chronoweave_arcs::domain::arc::{CharacterArc, MasterArc};
use chronoweave_core::error::DomainError;
use chronoweave_core::event::NarrativeEvent;
use chronoweave_simulation::application::control::{self, SessionStatus};
use chronoweave_simulation::domain::config::{CharacterSeed, SimulationConfig, SimulationRequest};
use chronoweave_simulation::domain::run::SimulationRun;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::state::AppState;
use crate::stream::progress_stream;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSimulationBody {
    /// Timeline bounds and mode.
    pub config: Option<SimulationConfig>,
    /// Seeded characters.
    pub characters: Option<Vec<CharacterSeed>>,
    /// Seeded character arcs.
    #[serde(default)]
    pub character_arcs: Vec<CharacterArc>,
    /// Seeded master arc.
    #[serde(default)]
    pub master_arc: Option<MasterArc>,
    /// Existing event log, oldest first.
    #[serde(default)]
    pub events: Vec<NarrativeEvent>,
    /// Opaque world seed.
    #[serde(default)]
    pub world: serde_json::Value,
}

impl StartSimulationBody {
    fn into_request(self) -> Result<SimulationRequest, DomainError> {
        let mut missing = Vec::new();
        if self.config.is_none() {
            missing.push("config");
        }
        if self.characters.is_none() {
            missing.push("characters");
        }

        match (self.config, self.characters) {
            (Some(config), Some(characters)) => Ok(SimulationRequest {
                config,
                world: self.world,
                characters,
                character_arcs: self.character_arcs,
                master_arc: self.master_arc,
                events: self.events,
            }),
            _ => Err(DomainError::MissingFields(missing)),
        }
    }
}

/// POST /
///
/// Validates the request and answers with the run's progress as a
/// `text/event-stream`.
#[instrument(skip(state, body))]
async fn start_simulation(
    State(state): State<AppState>,
    Json(body): Json<StartSimulationBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.into_request()?;
    let handle = state.runner.start(request)?;

    info!(
        session_id = %handle.session_id,
        run_id = %handle.run_id,
        "simulation started"
    );

    Ok(progress_stream(handle.progress))
}

/// GET /sessions/{session_id}
#[instrument(skip(state))]
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatus>, ApiError> {
    Ok(Json(control::describe(&state.registry, &session_id)?))
}

/// GET /runs
async fn list_runs(State(state): State<AppState>) -> Json<Vec<SimulationRun>> {
    Json(state.history.list())
}

/// GET /runs/{run_id}
#[instrument(skip(state))]
async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<SimulationRun>, ApiError> {
    Ok(Json(state.history.get(&run_id)?))
}

/// Returns the router for starting runs and run queries.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(start_simulation))
        .route("/sessions/{session_id}", get(get_session))
        .route("/runs", get(list_runs))
        .route("/runs/{run_id}", get(get_run))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use chronoweave_core::clock::Clock;
    use chronoweave_core::rng::DeterministicRng;
    use chronoweave_simulation::application::engine::EngineSettings;
    use chronoweave_test_support::{FixedClock, MockRng, ScriptedGenerator};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::state::RunLimits;

    fn test_app_state() -> AppState {
        let clock: Arc<dyn Clock + Send + Sync> = Arc::new(FixedClock::standard());
        let rng: Arc<Mutex<dyn DeterministicRng + Send>> = Arc::new(Mutex::new(MockRng));
        AppState::new(
            Arc::new(ScriptedGenerator::one_event_per_character()),
            clock,
            rng,
            EngineSettings::default(),
            RunLimits {
                stream_buffer: 16,
                run_history_limit: 10,
            },
        )
    }

    fn post(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    async fn json_of(response: axum::response::Response) -> Value {
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body_bytes).unwrap()
    }

    #[tokio::test]
    async fn test_start_returns_event_stream() {
        // Arrange
        let app = router().with_state(test_app_state());
        let body = json!({
            "config": { "startYear": 1200, "endYear": 1200, "batchMode": "speed" },
            "characters": [{ "id": "aria", "name": "Aria" }]
        });

        // Act
        let response = app.oneshot(post(&body)).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/event-stream"));
    }

    #[tokio::test]
    async fn test_start_without_config_or_characters_returns_400() {
        // Arrange
        let state = test_app_state();
        let app = router().with_state(state.clone());

        // Act
        let response = app.oneshot(post(&json!({ "world": {} }))).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_of(response).await;
        assert_eq!(json["error"], "missing_fields");
        assert_eq!(json["message"], "missing required fields: config, characters");
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn test_start_with_inverted_timeline_returns_400_and_registers_nothing() {
        let state = test_app_state();
        let app = router().with_state(state.clone());
        let body = json!({
            "config": { "startYear": 1300, "endYear": 1200 },
            "characters": [{ "id": "aria", "name": "Aria" }]
        });

        let response = app.oneshot(post(&body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(response).await["error"], "validation_error");
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn test_start_with_malformed_json_is_rejected() {
        let app = router().with_state(test_app_state());
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from("{ not json"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_unknown_session_returns_404() {
        let app = router().with_state(test_app_state());
        let request = Request::builder()
            .uri("/sessions/sim-123")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_of(response).await["error"], "session_not_found");
    }

    #[tokio::test]
    async fn test_runs_are_empty_before_any_run_finishes() {
        let app = router().with_state(test_app_state());
        let request = Request::builder().uri("/runs").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_of(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_unknown_run_returns_404() {
        let app = router().with_state(test_app_state());
        let request = Request::builder()
            .uri("/runs/run-missing")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_of(response).await["error"], "run_not_found");
    }
}
