//! Builders for generator payloads.

use std::collections::BTreeSet;

use chronoweave_core::event::{Importance, NarrativeEvent, Season, TimelinePoint};
use chronoweave_core::generator::{GenerationOutput, GenerationRequest};

/// A minor event for `character_id` dated at `point`. Season-less points
/// are dated in spring.
#[must_use]
pub fn narrative_event(character_id: &str, point: TimelinePoint, title: &str) -> NarrativeEvent {
    let season = point.season.unwrap_or(Season::Spring);
    NarrativeEvent {
        id: format!("{character_id}-{}-{season}", point.year),
        character_id: character_id.to_owned(),
        year: point.year,
        season,
        title: title.to_owned(),
        summary: format!("{title} ({character_id}, {point})"),
        tags: BTreeSet::new(),
        importance: Importance::Minor,
        related_characters: Vec::new(),
    }
}

/// One event per requested character and nothing else.
#[must_use]
pub fn events_for(request: &GenerationRequest) -> GenerationOutput {
    GenerationOutput {
        events: request
            .characters
            .iter()
            .map(|c| narrative_event(&c.id, request.point, &format!("{} in {}", c.name, request.point)))
            .collect(),
        ..GenerationOutput::default()
    }
}
