//! Progress frames emitted by a run.

use chrono::{DateTime, Utc};
use chronoweave_arcs::domain::arc::{CharacterArc, MasterArc};
use chronoweave_arcs::domain::updates::ArcUpdate;
use chronoweave_core::event::{NarrativeEvent, TimelinePoint};
use chronoweave_health::domain::warning::StorylineWarning;
use serde::Serialize;

use super::run::{CharacterSnapshot, PauseCause, RunStatus};

/// Counters collected over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    /// Timeline steps finished.
    pub steps_completed: usize,
    /// Timeline steps in the configuration.
    pub total_steps: usize,
    /// Events appended by this run.
    pub events_generated: usize,
    /// Generator invocations, retries included.
    pub generator_calls: usize,
    /// Invocations that were retries.
    pub retries: usize,
    /// Health evaluations performed.
    pub health_checks: usize,
    /// Health warnings raised.
    pub warnings_raised: usize,
}

/// Aggregate state carried by a run's terminal frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalState {
    /// Run id.
    pub run_id: String,
    /// Terminal status.
    pub status: RunStatus,
    /// Per-character previews, in cast order.
    pub characters: Vec<CharacterSnapshot>,
    /// Final character arcs.
    pub character_arcs: Vec<CharacterArc>,
    /// Final master arc.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_arc: Option<MasterArc>,
    /// Run counters.
    pub metrics: RunMetrics,
    /// Last year a step completed in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_year: Option<i32>,
    /// Why the run was aborted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    /// Turning points of the run in timeline order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrated_storyline: Option<String>,
}

/// One unit of run progress. Serialized with a `type` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ProgressEvent {
    /// Always the first frame of a run.
    SessionInit {
        /// Id to address control requests to.
        session_id: String,
        /// Id of the run record.
        run_id: String,
        /// When the run was created.
        started_at: DateTime<Utc>,
    },
    /// The engine parked or resumed.
    Status {
        /// New status.
        status: RunStatus,
        /// Cause, when paused.
        #[serde(skip_serializing_if = "Option::is_none")]
        pause_cause: Option<PauseCause>,
    },
    /// An event was appended to the log.
    #[serde(rename = "narrative_event")]
    Narrative {
        /// The appended event.
        event: NarrativeEvent,
    },
    /// An arc changed.
    ArcUpdate {
        /// The change.
        update: ArcUpdate,
    },
    /// A timeline step finished.
    StepComplete {
        /// The step.
        point: TimelinePoint,
        /// Steps finished so far.
        steps_completed: usize,
        /// Steps in the timeline.
        total_steps: usize,
    },
    /// The health monitor flagged the storyline.
    Warning {
        /// The report.
        warning: StorylineWarning,
    },
    /// Terminal frame of a completed or aborted run.
    FinalState(FinalState),
    /// Terminal frame of an errored run.
    Error {
        /// What went wrong.
        message: String,
        /// State at the point of failure.
        #[serde(flatten)]
        state: FinalState,
    },
}

impl ProgressEvent {
    /// The `type` discriminator, used as the SSE event name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionInit { .. } => "session_init",
            Self::Status { .. } => "status",
            Self::Narrative { .. } => "narrative_event",
            Self::ArcUpdate { .. } => "arc_update",
            Self::StepComplete { .. } => "step_complete",
            Self::Warning { .. } => "warning",
            Self::FinalState(_) => "final_state",
            Self::Error { .. } => "error",
        }
    }

    /// Returns `true` for the frames that end a run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalState(_) | Self::Error { .. })
    }
}
