//! The session control surface: pause, resume, abort.

use std::fmt;
use std::str::FromStr;

use chronoweave_core::error::DomainError;
use serde::Serialize;
use tracing::info;

use super::registry::SessionRegistry;
use crate::domain::run::{PauseCause, RunStatus};
use crate::domain::session::CancelReason;

/// A control request against a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    /// Set the pause flag.
    Pause,
    /// Clear the pause flag.
    Resume,
    /// Cancel the run and forget the session.
    Abort,
}

impl FromStr for ControlAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "abort" => Ok(Self::Abort),
            other => Err(DomainError::UnknownAction(other.to_owned())),
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pause => f.write_str("pause"),
            Self::Resume => f.write_str("resume"),
            Self::Abort => f.write_str("abort"),
        }
    }
}

/// Result of an accepted control request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlOutcome {
    /// The session addressed.
    pub session_id: String,
    /// The action applied.
    pub action: ControlAction,
    /// Status the session was asked into.
    pub status: RunStatus,
}

/// Snapshot of an in-flight session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// The session.
    pub session_id: String,
    /// Requested status.
    pub status: RunStatus,
    /// Why the session is paused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_cause: Option<PauseCause>,
}

/// Applies `action` to the session registered under `session_id`.
///
/// Abort removes the session immediately, so later requests for the same id
/// are not found even while the run winds down.
///
/// # Errors
///
/// Returns `DomainError::SessionNotFound` if no run is in flight under
/// `session_id`.
pub fn control(
    registry: &SessionRegistry,
    session_id: &str,
    action: ControlAction,
) -> Result<ControlOutcome, DomainError> {
    let session = registry.get(session_id)?;
    let status = match action {
        ControlAction::Pause => {
            session.pause(PauseCause::User);
            RunStatus::Paused
        }
        ControlAction::Resume => {
            session.resume();
            RunStatus::Running
        }
        ControlAction::Abort => {
            session.cancel(CancelReason::UserAbort);
            registry.delete(session_id);
            RunStatus::Aborted
        }
    };
    info!(session_id, %action, %status, "control request applied");
    Ok(ControlOutcome {
        session_id: session_id.to_owned(),
        action,
        status,
    })
}

/// Describes the session registered under `session_id`.
///
/// # Errors
///
/// Returns `DomainError::SessionNotFound` if no run is in flight under
/// `session_id`.
pub fn describe(registry: &SessionRegistry, session_id: &str) -> Result<SessionStatus, DomainError> {
    let session = registry.get(session_id)?;
    Ok(SessionStatus {
        session_id: session_id.to_owned(),
        status: session.status(),
        pause_cause: session.pause_cause(),
    })
}
