//! Run configuration and seed state.

use std::collections::HashSet;

use chronoweave_arcs::domain::arc::{CharacterArc, MasterArc};
use chronoweave_core::error::DomainError;
use chronoweave_core::event::NarrativeEvent;
use chronoweave_core::generator::CharacterContext;
use serde::{Deserialize, Serialize};

/// Longest timeline a single run may cover, in years.
pub const MAX_SPAN_YEARS: i32 = 1000;

/// Speed/quality trade-off for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// One step per season, one generator call per active character.
    #[default]
    Quality,
    /// One step per year, one generator call for all active characters.
    Speed,
}

/// Immutable description of the timeline a run covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    /// First simulated year, inclusive.
    pub start_year: i32,
    /// Last simulated year, inclusive.
    pub end_year: i32,
    /// Speed/quality trade-off.
    #[serde(default)]
    pub batch_mode: BatchMode,
    /// Reference to the world seed, if the caller tracks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_id: Option<String>,
    /// Characters taking part. Empty means every seeded character.
    #[serde(default)]
    pub character_ids: Vec<String>,
}

/// A character supplied with the run request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSeed {
    /// Character id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Narrative archetype.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype: Option<String>,
    /// First year the character takes part, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_from: Option<i32>,
    /// Last year the character takes part, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_until: Option<i32>,
    /// Opaque profile passed through to the generator.
    #[serde(default)]
    pub profile: serde_json::Value,
}

impl CharacterSeed {
    /// Returns `true` when `year` lies within the character's active bounds.
    #[must_use]
    pub fn is_active_in(&self, year: i32) -> bool {
        self.active_from.is_none_or(|from| year >= from)
            && self.active_until.is_none_or(|until| year <= until)
    }

    /// What the generator is told about this character.
    #[must_use]
    pub fn context(&self) -> CharacterContext {
        CharacterContext {
            id: self.id.clone(),
            name: self.name.clone(),
            archetype: self.archetype.clone(),
            profile: self.profile.clone(),
        }
    }
}

/// Everything needed to start a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    /// Timeline bounds and mode.
    pub config: SimulationConfig,
    /// Opaque world seed passed through to the generator.
    #[serde(default)]
    pub world: serde_json::Value,
    /// Seeded characters.
    pub characters: Vec<CharacterSeed>,
    /// Seeded character arcs.
    #[serde(default)]
    pub character_arcs: Vec<CharacterArc>,
    /// Seeded master arc.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_arc: Option<MasterArc>,
    /// Existing event log, oldest first.
    #[serde(default)]
    pub events: Vec<NarrativeEvent>,
}

impl SimulationRequest {
    /// Checks the request before any session is created.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the timeline is inverted or too
    /// long, the cast is empty or ambiguous, a reference points at an
    /// unknown character, a character has more than one arc, or a seeded
    /// arc violates the arc invariants.
    pub fn validate(&self) -> Result<(), DomainError> {
        let config = &self.config;
        if config.start_year > config.end_year {
            return Err(DomainError::Validation(format!(
                "startYear {} is after endYear {}",
                config.start_year, config.end_year
            )));
        }
        let span = i64::from(config.end_year) - i64::from(config.start_year) + 1;
        if span > i64::from(MAX_SPAN_YEARS) {
            return Err(DomainError::Validation(format!(
                "timeline spans {span} years; at most {MAX_SPAN_YEARS} are allowed"
            )));
        }
        if self.characters.is_empty() {
            return Err(DomainError::Validation(
                "at least one character is required".to_owned(),
            ));
        }

        let mut seeded = HashSet::new();
        for character in &self.characters {
            if character.id.trim().is_empty() {
                return Err(DomainError::Validation(
                    "character ids must not be blank".to_owned(),
                ));
            }
            if !seeded.insert(character.id.as_str()) {
                return Err(DomainError::Validation(format!(
                    "character '{}' is listed more than once",
                    character.id
                )));
            }
        }

        if let Some(unknown) = config
            .character_ids
            .iter()
            .find(|id| !seeded.contains(id.as_str()))
        {
            return Err(DomainError::Validation(format!(
                "characterIds references unknown character '{unknown}'"
            )));
        }

        let mut with_arc = HashSet::new();
        for arc in &self.character_arcs {
            if !seeded.contains(arc.character_id.as_str()) {
                return Err(DomainError::Validation(format!(
                    "arc references unknown character '{}'",
                    arc.character_id
                )));
            }
            if !with_arc.insert(arc.character_id.as_str()) {
                return Err(DomainError::Validation(format!(
                    "character '{}' has more than one arc",
                    arc.character_id
                )));
            }
            arc.validate()?;
        }

        if let Some(master) = &self.master_arc {
            master.validate()?;
        }
        Ok(())
    }

    /// Characters taking part in the run, in seed order.
    #[must_use]
    pub fn cast(&self) -> Vec<CharacterSeed> {
        let ids = &self.config.character_ids;
        self.characters
            .iter()
            .filter(|c| ids.is_empty() || ids.contains(&c.id))
            .cloned()
            .collect()
    }
}
