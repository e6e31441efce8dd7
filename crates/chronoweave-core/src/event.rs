//! Timeline model: narrative events and the points they occupy.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Season within a simulated year, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    /// First quarter.
    Spring,
    /// Second quarter.
    Summer,
    /// Third quarter.
    Autumn,
    /// Fourth quarter.
    Winter,
}

impl Season {
    /// All seasons in chronological order.
    pub const ALL: [Season; 4] = [Season::Spring, Season::Summer, Season::Autumn, Season::Winter];
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
            Season::Winter => "winter",
        };
        f.write_str(name)
    }
}

/// A position on the simulated timeline.
///
/// `season` is `None` when the cursor moves a whole year per step. Ordering
/// compares the year first, and a season-less point sorts before any season
/// of the same year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimelinePoint {
    /// Simulated year.
    pub year: i32,
    /// Season within the year, if the cursor is season-granular.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<Season>,
}

impl TimelinePoint {
    /// A point covering a whole year.
    #[must_use]
    pub fn year(year: i32) -> Self {
        Self { year, season: None }
    }

    /// A point at a specific season.
    #[must_use]
    pub fn seasonal(year: i32, season: Season) -> Self {
        Self {
            year,
            season: Some(season),
        }
    }

    /// Returns `true` when `season` falls within this point.
    #[must_use]
    pub fn admits(&self, season: Season) -> bool {
        self.season.is_none_or(|own| own == season)
    }
}

impl fmt::Display for TimelinePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.season {
            Some(season) => write!(f, "{} {}", season, self.year),
            None => write!(f, "{}", self.year),
        }
    }
}

/// How much an event matters to the wider story.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    /// Background texture.
    #[default]
    Minor,
    /// Worth surfacing in summaries.
    Notable,
    /// Changes the direction of the story.
    TurningPoint,
}

/// One atomic unit of generated story content.
///
/// Immutable once appended to a run's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeEvent {
    /// Event identifier, unique within a run's log.
    #[serde(default)]
    pub id: String,
    /// The character the event is attributed to.
    pub character_id: String,
    /// Simulated year.
    pub year: i32,
    /// Season within the year.
    pub season: Season,
    /// Short headline.
    pub title: String,
    /// Prose summary.
    #[serde(default)]
    pub summary: String,
    /// Free-form labels.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Story weight.
    #[serde(default)]
    pub importance: Importance,
    /// Other characters involved, in the order the generator listed them.
    #[serde(default)]
    pub related_characters: Vec<String>,
}

impl NarrativeEvent {
    /// The timeline point the event occupies.
    #[must_use]
    pub fn point(&self) -> TimelinePoint {
        TimelinePoint::seasonal(self.year, self.season)
    }

    /// Returns `true` if the character is the subject or a participant.
    #[must_use]
    pub fn involves(&self, character_id: &str) -> bool {
        self.character_id == character_id
            || self.related_characters.iter().any(|id| id == character_id)
    }

    /// Returns `true` if the event carries the tag (case-insensitive).
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}
