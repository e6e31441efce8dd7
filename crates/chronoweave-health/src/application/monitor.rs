//! Storyline health evaluation.
//!
//! [`evaluate`] is a pure function: identical input always yields an
//! identical result, and nothing outside the input is read or written.
//! Thresholds are fixed policy.

use std::collections::BTreeMap;

use chronoweave_arcs::domain::arc::{CharacterArc, MasterArc};
use chronoweave_core::event::NarrativeEvent;
use chronoweave_core::generator::CharacterMetrics;

use crate::domain::warning::{
    BetrayalPrediction, CharacterWarnings, ConvergenceStatus, Severity, StorylineWarning, Warning,
    WarningType,
};

/// Overall theme alignment below this requires review.
pub const THEME_ALIGNMENT_FLOOR: u8 = 40;
/// Overall interest below this requires review.
pub const INTEREST_FLOOR: u8 = 40;
/// Per-character readings below this are critical.
pub const CRITICAL_FLOOR: u8 = 20;
/// Tension at or above this with little progress is an overload.
pub const TENSION_OVERLOAD: u8 = 90;
/// Fulfillment below this counts as little progress.
pub const OVERLOAD_FULFILLMENT_CEILING: u8 = 25;
/// A character absent from a recent window this large is stalled.
pub const STALL_WINDOW: usize = 6;
/// Tags that mark an event as adversarial between its participants.
pub const BETRAYAL_TAGS: [&str; 3] = ["betrayal", "conflict", "rivalry"];
/// Adversarial events a pair needs before a betrayal is predicted.
pub const BETRAYAL_MIN_EVENTS: usize = 2;

/// Aggregate state the monitor looks at.
#[derive(Debug, Clone, Copy)]
pub struct HealthInput<'a> {
    /// Character arcs.
    pub arcs: &'a [CharacterArc],
    /// Master arc, if any.
    pub master_arc: Option<&'a MasterArc>,
    /// Recent events, oldest first.
    pub recent_events: &'a [NarrativeEvent],
    /// Latest metrics, one entry per character.
    pub metrics: &'a [CharacterMetrics],
    /// Characters active at the evaluated point.
    pub active_characters: &'a [String],
}

/// Builds the full health report regardless of thresholds.
#[must_use]
pub fn assess(input: &HealthInput<'_>) -> StorylineWarning {
    let overall_theme_alignment =
        mean(input.metrics.iter().map(|m| m.theme_alignment)).unwrap_or(100);
    let overall_interest = mean(input.metrics.iter().map(|m| m.interest)).unwrap_or(100);

    let characters: Vec<CharacterWarnings> = character_order(input)
        .into_iter()
        .filter_map(|id| {
            let warnings = character_findings(input, &id);
            (!warnings.is_empty()).then_some(CharacterWarnings {
                character_id: id,
                warnings,
            })
        })
        .collect();

    let convergence_status = convergence(input.recent_events);
    let betrayal_prediction = predict_betrayal(input);
    let recommendation = recommend(
        &characters,
        overall_theme_alignment,
        overall_interest,
        betrayal_prediction.as_ref(),
    );

    StorylineWarning {
        characters,
        overall_theme_alignment,
        overall_interest,
        convergence_status,
        betrayal_prediction,
        recommendation,
    }
}

/// Returns `true` when the report crosses a review threshold.
#[must_use]
pub fn requires_review(report: &StorylineWarning) -> bool {
    report.overall_theme_alignment < THEME_ALIGNMENT_FLOOR
        || report.overall_interest < INTEREST_FLOOR
        || report.worst_severity() == Some(Severity::Critical)
}

/// Returns a warning when the storyline needs human review, `None` otherwise.
#[must_use]
pub fn evaluate(input: &HealthInput<'_>) -> Option<StorylineWarning> {
    let report = assess(input);
    requires_review(&report).then_some(report)
}

fn mean(values: impl Iterator<Item = u8>) -> Option<u8> {
    let (sum, count) = values.fold((0_u32, 0_u32), |(s, n), v| (s + u32::from(v), n + 1));
    if count == 0 {
        return None;
    }
    u8::try_from((sum + count / 2) / count).ok()
}

/// Active characters first, then anyone else with metrics or an arc.
fn character_order(input: &HealthInput<'_>) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let candidates = input
        .active_characters
        .iter()
        .chain(input.metrics.iter().map(|m| &m.character_id))
        .chain(input.arcs.iter().map(|a| &a.character_id));
    for id in candidates {
        if !order.contains(id) {
            order.push(id.clone());
        }
    }
    order
}

fn level_finding(
    value: u8,
    floor: u8,
    warning_type: WarningType,
    what: &str,
) -> Option<Warning> {
    if value >= floor {
        return None;
    }
    let severity = if value < CRITICAL_FLOOR {
        Severity::Critical
    } else {
        Severity::High
    };
    Some(Warning {
        warning_type,
        message: format!("{what} has fallen to {value}"),
        severity,
    })
}

fn character_findings(input: &HealthInput<'_>, character_id: &str) -> Vec<Warning> {
    let mut warnings = Vec::new();

    if let Some(metrics) = input.metrics.iter().find(|m| m.character_id == character_id) {
        warnings.extend(level_finding(
            metrics.theme_alignment,
            THEME_ALIGNMENT_FLOOR,
            WarningType::ThemeDrift,
            "theme alignment",
        ));
        warnings.extend(level_finding(
            metrics.interest,
            INTEREST_FLOOR,
            WarningType::LowInterest,
            "interest",
        ));
    }

    if let Some(arc) = input.arcs.iter().find(|a| a.character_id == character_id) {
        if arc.tension >= TENSION_OVERLOAD && arc.fulfillment < OVERLOAD_FULFILLMENT_CEILING {
            warnings.push(Warning {
                warning_type: WarningType::TensionOverload,
                message: format!(
                    "tension is {} while only {}% of the arc is fulfilled",
                    arc.tension, arc.fulfillment
                ),
                severity: Severity::High,
            });
        }
    }

    let active = input.active_characters.iter().any(|id| id == character_id);
    if active
        && input.recent_events.len() >= STALL_WINDOW
        && !input.recent_events.iter().any(|e| e.involves(character_id))
    {
        warnings.push(Warning {
            warning_type: WarningType::StalledArc,
            message: format!(
                "absent from the last {} events",
                input.recent_events.len()
            ),
            severity: Severity::Low,
        });
    }

    warnings
}

fn convergence(recent: &[NarrativeEvent]) -> ConvergenceStatus {
    if recent.is_empty() {
        return ConvergenceStatus::InsufficientData;
    }
    let shared = recent
        .iter()
        .filter(|e| e.related_characters.iter().any(|r| *r != e.character_id))
        .count();
    if shared == 0 {
        ConvergenceStatus::Diverging
    } else if shared * 2 >= recent.len() {
        ConvergenceStatus::Converging
    } else {
        ConvergenceStatus::Parallel
    }
}

fn predict_betrayal(input: &HealthInput<'_>) -> Option<BetrayalPrediction> {
    // Keyed by the id pair in sorted order; the tally counts events authored by each side.
    let mut pairs: BTreeMap<(&str, &str), [usize; 2]> = BTreeMap::new();
    for event in input.recent_events {
        if !BETRAYAL_TAGS.iter().any(|tag| event.has_tag(tag)) {
            continue;
        }
        let author = event.character_id.as_str();
        for related in &event.related_characters {
            let related = related.as_str();
            if related == author {
                continue;
            }
            let key = if author < related { (author, related) } else { (related, author) };
            let side = usize::from(key.0 != author);
            pairs.entry(key).or_default()[side] += 1;
        }
    }

    let mut best: Option<((&str, &str), [usize; 2])> = None;
    for (pair, tally) in pairs {
        let count = tally[0] + tally[1];
        if count >= BETRAYAL_MIN_EVENTS && best.is_none_or(|(_, top)| count > top[0] + top[1]) {
            best = Some((pair, tally));
        }
    }

    let tension_of = |id: &str| {
        input
            .arcs
            .iter()
            .find(|a| a.character_id == id)
            .map_or(0, |a| usize::from(a.tension))
    };
    best.map(|((first, second), tally)| {
        let first_leads = (tension_of(first), tally[0]) >= (tension_of(second), tally[1]);
        let (character_id, target_id) = if first_leads { (first, second) } else { (second, first) };
        let likelihood = (25 * (tally[0] + tally[1]) + tension_of(character_id) / 4).min(100);
        BetrayalPrediction {
            character_id: character_id.to_owned(),
            target_id: target_id.to_owned(),
            likelihood: u8::try_from(likelihood).unwrap_or(100),
        }
    })
}

fn recommend(
    characters: &[CharacterWarnings],
    theme_alignment: u8,
    interest: u8,
    betrayal: Option<&BetrayalPrediction>,
) -> String {
    let first_with = |severity: Severity| {
        characters.iter().find_map(|c| {
            c.warnings
                .iter()
                .find(|w| w.severity == severity)
                .map(|w| (c.character_id.as_str(), w.message.as_str()))
        })
    };

    if let Some((id, message)) = first_with(Severity::Critical) {
        return format!("Review {id} before continuing: {message}.");
    }
    if theme_alignment < THEME_ALIGNMENT_FLOOR {
        return "Steer upcoming events back toward the story's central themes.".to_owned();
    }
    if interest < INTEREST_FLOOR {
        return "Introduce a turning point to restore momentum.".to_owned();
    }
    if let Some((id, message)) = first_with(Severity::High) {
        return format!("Keep an eye on {id}: {message}.");
    }
    if let Some(b) = betrayal {
        return format!(
            "Foreshadow {}'s betrayal of {} before it lands.",
            b.character_id, b.target_id
        );
    }
    "Storyline is healthy; continue the simulation.".to_owned()
}
