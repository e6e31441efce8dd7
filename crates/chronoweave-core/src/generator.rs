//! Narrative generator contract.
//!
//! The generator is an opaque external collaborator: given the state of the
//! world at a timeline point it returns the next batch of events along with
//! arc progress and storyline metrics. Implementations may fail or return
//! output the engine rejects; the engine owns validation and retries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::CancellationSignal;
use crate::event::{NarrativeEvent, TimelinePoint};

/// A character the generator should write for at this step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterContext {
    /// Character identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Narrative archetype, if seeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype: Option<String>,
    /// Opaque profile data carried through from the seed.
    #[serde(default)]
    pub profile: serde_json::Value,
}

/// Where an arc currently stands, as the generator needs to see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcContext {
    /// Owning character; `None` for the master arc.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<String>,
    /// Name of the current phase or act.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_name: Option<String>,
    /// Descriptions of the beats still required to leave the current phase.
    pub pending_beats: Vec<String>,
    /// Current tension, 0–100.
    pub tension: u8,
}

/// Input to one generator invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// The run this call belongs to.
    pub run_id: String,
    /// Cursor position being generated.
    pub point: TimelinePoint,
    /// 1-based attempt number for this step.
    pub attempt: u32,
    /// Characters to write for.
    pub characters: Vec<CharacterContext>,
    /// Arc context for those characters that have arcs.
    pub arcs: Vec<ArcContext>,
    /// Master arc context, if the run has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_arc: Option<ArcContext>,
    /// Most recent events in the log, oldest first.
    pub recent_events: Vec<NarrativeEvent>,
    /// Opaque world seed.
    #[serde(default)]
    pub world: serde_json::Value,
}

impl GenerationRequest {
    /// Returns `true` if the character is one of the request's subjects.
    #[must_use]
    pub fn includes_character(&self, character_id: &str) -> bool {
        self.characters.iter().any(|c| c.id == character_id)
    }
}

/// A beat the generator reports as achieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatProgress {
    /// Arc owner; `None` targets the master arc.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<String>,
    /// Description of the beat, matched against the current phase.
    pub beat: String,
}

/// New tension reading for a character arc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TensionReport {
    /// Arc owner.
    pub character_id: String,
    /// Tension, 0–100 (larger values are clamped).
    pub tension: u8,
}

/// Per-character storyline quality reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterMetrics {
    /// Character the reading applies to.
    pub character_id: String,
    /// How closely the character's recent story tracks the themes, 0–100.
    pub theme_alignment: u8,
    /// How engaging the character's recent story is, 0–100.
    pub interest: u8,
}

/// Output of one generator invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutput {
    /// New events, in the order they should be appended.
    #[serde(default)]
    pub events: Vec<NarrativeEvent>,
    /// Beats achieved, in the order they were achieved.
    #[serde(default)]
    pub beat_progress: Vec<BeatProgress>,
    /// Tension readings for character arcs.
    #[serde(default)]
    pub tension: Vec<TensionReport>,
    /// Tension reading for the master arc.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_tension: Option<u8>,
    /// Storyline metrics for the characters covered by the call.
    #[serde(default)]
    pub metrics: Vec<CharacterMetrics>,
}

/// Failure modes of a generator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    /// The call did not complete (network, timeout, 5xx, rate limit).
    #[error("generator transport failure: {0}")]
    Transport(String),

    /// The call completed but the output was unusable.
    #[error("malformed generator output: {0}")]
    Malformed(String),

    /// The generator refused the request outright.
    #[error("generator rejected request (status {status}): {message}")]
    Rejected {
        /// Status reported by the generator.
        status: u16,
        /// Reason given by the generator.
        message: String,
    },

    /// The call was abandoned because the run was cancelled.
    #[error("generator call cancelled")]
    Cancelled,
}

impl GeneratorError {
    /// Returns `true` if a fresh attempt could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Malformed(_))
    }
}

/// Produces the next batch of narrative for a timeline step.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    /// Generate content for `request`.
    ///
    /// Implementations that can abandon in-flight work should race it
    /// against `cancel`; the engine also races every call itself and
    /// discards late results.
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationSignal,
    ) -> Result<GenerationOutput, GeneratorError>;
}
