//! The run record and its lifecycle.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use chronoweave_core::error::DomainError;
use serde::{Deserialize, Serialize};

use super::config::SimulationConfig;

/// Lifecycle state of a run.
///
/// `idle -> running -> {running <-> paused} -> {completed | aborted | errored}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, not yet started.
    Idle,
    /// Advancing the timeline.
    Running,
    /// Parked until resumed or aborted.
    Paused,
    /// Reached the end of the timeline.
    Completed,
    /// Stopped by an abort or a disconnected client.
    Aborted,
    /// Stopped by an unrecoverable generator failure.
    Errored,
}

impl RunStatus {
    /// Returns `true` for states a run never leaves.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Errored)
    }

    fn can_become(self, next: Self) -> bool {
        use RunStatus::{Aborted, Completed, Errored, Idle, Paused, Running};
        matches!(
            (self, next),
            (Idle, Running | Aborted | Errored)
                | (Running, Paused | Completed | Aborted | Errored)
                | (Paused, Running | Aborted | Errored)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// What put a run into `paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseCause {
    /// A control request.
    User,
    /// The health monitor flagged the storyline for review.
    HealthWarning,
}

/// Preview of one character at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSnapshot {
    /// The character.
    pub character_id: String,
    /// Display name.
    pub name: String,
    /// Current arc phase, if the character has an arc.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_name: Option<String>,
    /// Arc tension.
    pub tension: u8,
    /// Arc fulfillment.
    pub fulfillment: u8,
    /// Events attributed to the character across the whole log, seeded
    /// history included. The integrated storyline covers only this run's events.
    pub event_count: usize,
    /// Title of the character's latest event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_title: Option<String>,
}

/// The record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRun {
    /// Run id.
    pub run_id: String,
    /// Session the run was controlled through.
    pub session_id: String,
    /// Lifecycle state.
    pub status: RunStatus,
    /// When the run was created.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Last year the run completed a step in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_year: Option<i32>,
    /// Per-character previews.
    #[serde(default)]
    pub character_snapshots: BTreeMap<String, CharacterSnapshot>,
    /// Turning points of the run in timeline order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrated_storyline: Option<String>,
    /// The configuration the run was started with.
    pub config: SimulationConfig,
    /// Why the run is (or last was) paused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_cause: Option<PauseCause>,
    /// Why the run was aborted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    /// Why the run errored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl SimulationRun {
    /// A new, idle run.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        session_id: impl Into<String>,
        config: SimulationConfig,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            session_id: session_id.into(),
            status: RunStatus::Idle,
            started_at,
            finished_at: None,
            final_year: None,
            character_snapshots: BTreeMap::new(),
            integrated_storyline: None,
            config,
            pause_cause: None,
            abort_reason: None,
            failure: None,
        }
    }

    /// Moves the run to `next`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if the lifecycle does not
    /// allow the move, including any move out of a terminal state.
    pub fn transition(&mut self, next: RunStatus) -> Result<(), DomainError> {
        if !self.status.can_become(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Parks the run, recording why.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the run is running.
    pub fn pause(&mut self, cause: PauseCause) -> Result<(), DomainError> {
        self.transition(RunStatus::Paused)?;
        self.pause_cause = Some(cause);
        Ok(())
    }

    /// Releases a parked run.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the run is paused.
    pub fn resume(&mut self) -> Result<(), DomainError> {
        if self.status != RunStatus::Paused {
            return Err(DomainError::InvalidTransition {
                from: self.status.to_string(),
                to: RunStatus::Running.to_string(),
            });
        }
        self.transition(RunStatus::Running)
    }

    /// Moves the run into a terminal state and stamps it.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if `status` is not terminal
    /// or the run cannot reach it from its current state.
    pub fn finish(&mut self, status: RunStatus, at: DateTime<Utc>) -> Result<(), DomainError> {
        if !status.is_terminal() {
            return Err(DomainError::InvalidTransition {
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }
        self.transition(status)?;
        self.finished_at = Some(at);
        Ok(())
    }
}
