//! Session control: pause, resume, and abort a run in flight.

use axum::extract::State;
use axum::{Json, Router, routing::post};
use chronoweave_core::error::DomainError;
use chronoweave_simulation::application::control::{self, ControlAction};
use chronoweave_simulation::domain::run::RunStatus;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /control.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    /// The session to act on.
    pub session_id: Option<String>,
    /// One of `pause`, `resume`, `abort`.
    pub action: Option<String>,
}

/// Response body returned after a control request is applied.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    /// Always `true`; failures are reported as error bodies.
    pub ok: bool,
    /// The session acted on.
    pub session_id: String,
    /// The action applied.
    pub action: ControlAction,
    /// Status the session was moved to.
    pub status: RunStatus,
}

/// POST /control
#[instrument(skip(state, request), fields(session_id = ?request.session_id, action = ?request.action))]
async fn control_session(
    State(state): State<AppState>,
    Json(request): Json<ControlRequest>,
) -> Result<Json<ControlResponse>, ApiError> {
    let session_id = request.session_id.filter(|s| !s.trim().is_empty());
    let action = request.action.filter(|a| !a.trim().is_empty());

    let (Some(session_id), Some(action)) = (session_id.as_deref(), action.as_deref()) else {
        let mut missing = Vec::new();
        if session_id.is_none() {
            missing.push("sessionId");
        }
        if action.is_none() {
            missing.push("action");
        }
        return Err(DomainError::MissingFields(missing).into());
    };

    let action: ControlAction = action.parse()?;
    let outcome = control::control(&state.registry, session_id, action)?;

    Ok(Json(ControlResponse {
        ok: true,
        session_id: outcome.session_id,
        action: outcome.action,
        status: outcome.status,
    }))
}

/// Returns the router for session control.
pub fn router() -> Router<AppState> {
    Router::new().route("/control", post(control_session))
}
