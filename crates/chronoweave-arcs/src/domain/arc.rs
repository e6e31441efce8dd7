//! Arc structures: phases, beats, character arcs, and the master arc.

use chronoweave_core::error::DomainError;
use chronoweave_core::generator::ArcContext;
use serde::{Deserialize, Serialize};

/// Upper bound for tension and fulfillment readings.
pub const MAX_LEVEL: u8 = 100;

/// A required condition for leaving a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beat {
    /// What has to happen.
    pub description: String,
    /// Whether it has happened.
    #[serde(default)]
    pub fulfilled: bool,
}

impl Beat {
    /// An unfulfilled beat.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            fulfilled: false,
        }
    }

    fn matches(&self, reported: &str) -> bool {
        self.description.trim().to_lowercase() == reported.trim().to_lowercase()
    }
}

/// One stage of an arc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    /// Phase name.
    pub name: String,
    /// Beats that must all be fulfilled before the arc moves on.
    #[serde(default)]
    pub required_beats: Vec<Beat>,
}

impl Phase {
    /// A phase with the given unfulfilled beats.
    #[must_use]
    pub fn new(name: impl Into<String>, beats: &[&str]) -> Self {
        Self {
            name: name.into(),
            required_beats: beats.iter().map(|b| Beat::new(*b)).collect(),
        }
    }

    /// Returns `true` when every required beat is fulfilled.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.required_beats.iter().all(|b| b.fulfilled)
    }

    fn pending_beats(&self) -> Vec<String> {
        self.required_beats
            .iter()
            .filter(|b| !b.fulfilled)
            .map(|b| b.description.clone())
            .collect()
    }
}

/// Acts of the master arc follow the same rules as character phases.
pub type Act = Phase;

/// Result of reporting a beat against an arc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeatOutcome {
    /// The beat was pending in the current phase and is now fulfilled.
    Fulfilled {
        /// Phase the beat belonged to.
        phase_index: usize,
        /// Canonical beat description.
        beat: String,
        /// New current phase, if fulfilling the beat moved the arc on.
        advanced_to: Option<usize>,
    },
    /// No pending beat in the current phase matches the report.
    NotPending,
}

/// Marks `reported` fulfilled in the current phase, then advances past every
/// phase that is now complete. The final phase is never advanced beyond.
fn fulfill_in(phases: &mut [Phase], current: &mut usize, reported: &str) -> BeatOutcome {
    let phase_index = *current;
    let Some(phase) = phases.get_mut(phase_index) else {
        return BeatOutcome::NotPending;
    };
    let Some(slot) = phase
        .required_beats
        .iter_mut()
        .find(|b| !b.fulfilled && b.matches(reported))
    else {
        return BeatOutcome::NotPending;
    };
    slot.fulfilled = true;
    let beat = slot.description.clone();

    settle(phases, current);

    BeatOutcome::Fulfilled {
        phase_index,
        beat,
        advanced_to: (*current != phase_index).then_some(*current),
    }
}

/// Advances past every complete phase, stopping at the last one.
fn settle(phases: &[Phase], current: &mut usize) {
    while *current + 1 < phases.len() && phases[*current].is_complete() {
        *current += 1;
    }
}

fn fulfillment_of(phases: &[Phase]) -> u8 {
    let total: usize = phases.iter().map(|p| p.required_beats.len()).sum();
    if total == 0 {
        return 0;
    }
    let done: usize = phases
        .iter()
        .map(|p| p.required_beats.iter().filter(|b| b.fulfilled).count())
        .sum();
    u8::try_from((done * 100 + total / 2) / total).unwrap_or(MAX_LEVEL)
}

fn validate_progression(phases: &[Phase], current: usize, owner: &str) -> Result<(), DomainError> {
    if phases.is_empty() {
        if current != 0 {
            return Err(DomainError::Validation(format!(
                "{owner}: current index {current} set on an arc with no phases"
            )));
        }
        return Ok(());
    }
    if current >= phases.len() {
        return Err(DomainError::Validation(format!(
            "{owner}: current index {current} out of range for {} phases",
            phases.len()
        )));
    }
    if let Some(open) = phases[..current].iter().find(|p| !p.is_complete()) {
        return Err(DomainError::Validation(format!(
            "{owner}: phase '{}' is behind the current phase but has unfulfilled beats",
            open.name
        )));
    }
    Ok(())
}

fn validate_level(value: u8, field: &str, owner: &str) -> Result<(), DomainError> {
    if value > MAX_LEVEL {
        return Err(DomainError::Validation(format!(
            "{owner}: {field} {value} exceeds {MAX_LEVEL}"
        )));
    }
    Ok(())
}

/// A character's planned progression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterArc {
    /// Owning character.
    pub character_id: String,
    /// Narrative archetype.
    #[serde(default)]
    pub archetype: String,
    /// Phases in order.
    pub phases: Vec<Phase>,
    /// Index of the phase in progress. Never decreases.
    #[serde(default)]
    pub current_phase: usize,
    /// Dramatic tension, 0–100.
    #[serde(default)]
    pub tension: u8,
    /// Share of required beats fulfilled, 0–100. Derived from the beats.
    #[serde(default)]
    pub fulfillment: u8,
}

impl CharacterArc {
    /// A fresh arc starting in its first phase.
    #[must_use]
    pub fn new(character_id: impl Into<String>, archetype: impl Into<String>, phases: Vec<Phase>) -> Self {
        Self {
            character_id: character_id.into(),
            archetype: archetype.into(),
            phases,
            current_phase: 0,
            tension: 0,
            fulfillment: 0,
        }
    }

    /// Checks the seeded state against the arc invariants.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the current phase is out of
    /// range, an earlier phase still has unfulfilled beats, or a level
    /// exceeds 100.
    pub fn validate(&self) -> Result<(), DomainError> {
        let owner = format!("arc '{}'", self.character_id);
        validate_progression(&self.phases, self.current_phase, &owner)?;
        validate_level(self.tension, "tension", &owner)
    }

    /// The phase in progress, if the arc has phases.
    #[must_use]
    pub fn phase(&self) -> Option<&Phase> {
        self.phases.get(self.current_phase)
    }

    /// Returns `true` once the final phase's beats are all fulfilled.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.phases.last().is_some_and(Phase::is_complete)
            && self.current_phase + 1 == self.phases.len()
    }

    /// Reports a beat as achieved.
    pub fn fulfill_beat(&mut self, reported: &str) -> BeatOutcome {
        let outcome = fulfill_in(&mut self.phases, &mut self.current_phase, reported);
        self.refresh_fulfillment();
        outcome
    }

    /// Moves a seeded arc off any phase that has nothing left to fulfill.
    /// Returns the phase it started on when it moved.
    pub fn settle(&mut self) -> Option<usize> {
        let from = self.current_phase;
        settle(&self.phases, &mut self.current_phase);
        (self.current_phase != from).then_some(from)
    }

    /// Sets tension, clamped to 0–100. Returns the previous value when it changed.
    pub fn set_tension(&mut self, tension: u8) -> Option<u8> {
        let next = tension.min(MAX_LEVEL);
        if next == self.tension {
            return None;
        }
        Some(std::mem::replace(&mut self.tension, next))
    }

    /// Recomputes `fulfillment` from the beats.
    pub fn refresh_fulfillment(&mut self) {
        self.fulfillment = fulfillment_of(&self.phases);
    }

    /// What the generator needs to know about this arc.
    #[must_use]
    pub fn context(&self) -> ArcContext {
        ArcContext {
            character_id: Some(self.character_id.clone()),
            phase_name: self.phase().map(|p| p.name.clone()),
            pending_beats: self.phase().map(Phase::pending_beats).unwrap_or_default(),
            tension: self.tension,
        }
    }
}

/// The overall story's planned progression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterArc {
    /// Acts in order.
    pub acts: Vec<Act>,
    /// Index of the act in progress. Never decreases.
    #[serde(default)]
    pub current_act: usize,
    /// Story-wide tension, 0–100.
    #[serde(default)]
    pub overall_tension: u8,
}

impl MasterArc {
    /// A fresh master arc starting in its first act.
    #[must_use]
    pub fn new(acts: Vec<Act>) -> Self {
        Self {
            acts,
            current_act: 0,
            overall_tension: 0,
        }
    }

    /// Checks the seeded state against the arc invariants.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` under the same rules as
    /// [`CharacterArc::validate`].
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_progression(&self.acts, self.current_act, "master arc")?;
        validate_level(self.overall_tension, "overall tension", "master arc")
    }

    /// The act in progress, if any.
    #[must_use]
    pub fn act(&self) -> Option<&Act> {
        self.acts.get(self.current_act)
    }

    /// Reports a master-arc beat as achieved.
    pub fn fulfill_beat(&mut self, reported: &str) -> BeatOutcome {
        fulfill_in(&mut self.acts, &mut self.current_act, reported)
    }

    /// Moves a seeded master arc off any act that has nothing left to
    /// fulfill. Returns the act it started on when it moved.
    pub fn settle(&mut self) -> Option<usize> {
        let from = self.current_act;
        settle(&self.acts, &mut self.current_act);
        (self.current_act != from).then_some(from)
    }

    /// Sets overall tension, clamped to 0–100. Returns the previous value when it changed.
    pub fn set_tension(&mut self, tension: u8) -> Option<u8> {
        let next = tension.min(MAX_LEVEL);
        if next == self.overall_tension {
            return None;
        }
        Some(std::mem::replace(&mut self.overall_tension, next))
    }

    /// Share of required beats fulfilled across all acts, 0–100.
    #[must_use]
    pub fn fulfillment(&self) -> u8 {
        fulfillment_of(&self.acts)
    }

    /// What the generator needs to know about the master arc.
    #[must_use]
    pub fn context(&self) -> ArcContext {
        ArcContext {
            character_id: None,
            phase_name: self.act().map(|a| a.name.clone()),
            pending_beats: self.act().map(Phase::pending_beats).unwrap_or_default(),
            tension: self.overall_tension,
        }
    }
}
