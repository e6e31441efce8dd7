//! End-to-end runs through the runner, engine, and progress channel.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use chronoweave_arcs::domain::arc::{CharacterArc, Phase};
use chronoweave_core::error::DomainError;
use chronoweave_core::event::{Importance, Season, TimelinePoint};
use chronoweave_core::generator::{
    BeatProgress, CharacterMetrics, GenerationOutput, GeneratorError, TensionReport,
};
use chronoweave_simulation::domain::config::BatchMode;
use chronoweave_simulation::domain::progress::ProgressEvent;
use chronoweave_simulation::domain::run::{PauseCause, RunStatus};
use chronoweave_test_support::{FailingGenerator, ScriptedGenerator, events_for, narrative_event};

use common::{count, drain, harness, terminal_json};

#[tokio::test]
async fn test_quality_run_completes_with_every_frame_accounted_for() {
    // Arrange
    let generator = Arc::new(ScriptedGenerator::one_event_per_character());
    let h = harness(generator.clone());
    let request = common::request(1200, 1201, BatchMode::Quality, &["aria", "bren"]);

    // Act
    let mut handle = h.runner.start(request).unwrap();
    let frames = drain(&mut handle.progress).await;
    let run = handle.task.await.unwrap();

    // Assert
    assert!(matches!(
        &frames[0],
        ProgressEvent::SessionInit { session_id, .. } if *session_id == handle.session_id
    ));
    let terminal = terminal_json(&frames);
    assert_eq!(terminal["type"], "final_state");
    assert_eq!(terminal["status"], "completed");
    assert_eq!(count(&frames, "narrative_event"), 16);
    assert_eq!(terminal["metrics"]["eventsGenerated"], 16);
    assert_eq!(count(&frames, "step_complete"), 8);
    assert_eq!(terminal["finalYear"], 1201);
    assert_eq!(terminal["characters"][0]["eventCount"], 8);
    assert_eq!(generator.call_count(), 16);
    assert!(generator.calls().iter().all(|c| c.characters.len() == 1));

    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.finished_at.is_some());
    assert!(h.registry.is_empty());
    assert_eq!(h.history.get(&handle.run_id).unwrap().status, RunStatus::Completed);
}

#[tokio::test]
async fn test_narrative_events_are_emitted_in_chronological_order() {
    let h = harness(Arc::new(ScriptedGenerator::one_event_per_character()));
    let request = common::request(1200, 1202, BatchMode::Quality, &["aria"]);

    let mut handle = h.runner.start(request).unwrap();
    let frames = drain(&mut handle.progress).await;

    let points: Vec<TimelinePoint> = frames
        .iter()
        .filter_map(|f| match f {
            ProgressEvent::Narrative { event } => Some(event.point()),
            _ => None,
        })
        .collect();
    assert_eq!(points.len(), 12);
    assert!(points.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_speed_mode_batches_characters_and_sorts_events_by_season() {
    // Arrange
    let generator = Arc::new(ScriptedGenerator::new(|request| {
        let mut winter = narrative_event("aria", request.point, "Snowbound");
        winter.season = Season::Winter;
        let mut spring = narrative_event("bren", request.point, "Thaw");
        spring.season = Season::Spring;
        Ok(GenerationOutput {
            events: vec![winter, spring],
            ..GenerationOutput::default()
        })
    }));
    let h = harness(generator.clone());
    let request = common::request(1200, 1201, BatchMode::Speed, &["aria", "bren"]);

    // Act
    let mut handle = h.runner.start(request).unwrap();
    let frames = drain(&mut handle.progress).await;

    // Assert
    assert_eq!(generator.call_count(), 2);
    assert!(generator.calls().iter().all(|c| c.characters.len() == 2 && c.point.season.is_none()));
    let seasons: Vec<Season> = frames
        .iter()
        .filter_map(|f| match f {
            ProgressEvent::Narrative { event } => Some(event.season),
            _ => None,
        })
        .collect();
    assert_eq!(
        seasons,
        vec![Season::Spring, Season::Winter, Season::Spring, Season::Winter]
    );
    assert_eq!(terminal_json(&frames)["status"], "completed");
}

#[tokio::test]
async fn test_characters_outside_their_active_years_are_not_generated_for() {
    let generator = Arc::new(ScriptedGenerator::one_event_per_character());
    let h = harness(generator.clone());
    let mut request = common::request(1200, 1202, BatchMode::Speed, &["aria", "bren"]);
    request.characters[1].active_from = Some(1202);

    let mut handle = h.runner.start(request).unwrap();
    drain(&mut handle.progress).await;

    let per_call: Vec<usize> = generator.calls().iter().map(|c| c.characters.len()).collect();
    assert_eq!(per_call, vec![1, 1, 2]);
}

#[tokio::test]
async fn test_generator_sees_arc_context_and_beats_advance_phases() {
    // Arrange
    let generator = Arc::new(ScriptedGenerator::new(|request| {
        let mut output = events_for(request);
        if request.point.year == 1200 {
            output.beat_progress = vec![
                BeatProgress {
                    character_id: Some("aria".to_owned()),
                    beat: "leaves HOME ".to_owned(),
                },
                BeatProgress {
                    character_id: Some("aria".to_owned()),
                    beat: "Meets mentor".to_owned(),
                },
            ];
            output.tension = vec![TensionReport {
                character_id: "aria".to_owned(),
                tension: 60,
            }];
        }
        Ok(output)
    }));
    let h = harness(generator.clone());
    let mut request = common::request(1200, 1201, BatchMode::Speed, &["aria"]);
    request.character_arcs = vec![CharacterArc::new(
        "aria",
        "hero",
        vec![
            Phase::new("Call", &["Leaves home", "Meets mentor"]),
            Phase::new("Trial", &["Faces rival"]),
        ],
    )];

    // Act
    let mut handle = h.runner.start(request).unwrap();
    let frames = drain(&mut handle.progress).await;

    // Assert
    let calls = generator.calls();
    assert_eq!(calls[0].arcs[0].pending_beats, vec!["Leaves home", "Meets mentor"]);
    assert_eq!(calls[1].arcs[0].phase_name.as_deref(), Some("Trial"));
    assert_eq!(calls[1].arcs[0].tension, 60);
    assert_eq!(calls[1].recent_events.len(), 1);

    let kinds: Vec<&str> = frames.iter().map(ProgressEvent::kind).collect();
    let first_arc = kinds.iter().position(|k| *k == "arc_update").unwrap();
    let first_event = kinds.iter().position(|k| *k == "narrative_event").unwrap();
    assert!(first_event < first_arc);
    assert_eq!(count(&frames, "arc_update"), 4);

    let terminal = terminal_json(&frames);
    assert_eq!(terminal["characterArcs"][0]["currentPhase"], 1);
    assert_eq!(terminal["characterArcs"][0]["fulfillment"], 67);
    assert_eq!(terminal["characters"][0]["phaseName"], "Trial");
}

#[tokio::test]
async fn test_arc_seeded_on_an_empty_phase_starts_on_the_next_one() {
    // Arrange
    let generator = Arc::new(ScriptedGenerator::new(|request| {
        let mut output = events_for(request);
        output.beat_progress = vec![BeatProgress {
            character_id: Some("aria".to_owned()),
            beat: "Leaves home".to_owned(),
        }];
        Ok(output)
    }));
    let h = harness(generator.clone());
    let mut request = common::request(1200, 1200, BatchMode::Speed, &["aria"]);
    request.character_arcs = vec![CharacterArc::new(
        "aria",
        "hero",
        vec![
            Phase::new("Prologue", &[]),
            Phase::new("Call", &["Leaves home"]),
            Phase::new("Trial", &["Faces rival"]),
        ],
    )];

    // Act
    let mut handle = h.runner.start(request).unwrap();
    let frames = drain(&mut handle.progress).await;

    // Assert
    assert_eq!(generator.calls()[0].arcs[0].pending_beats, vec!["Leaves home"]);
    let kinds: Vec<&str> = frames.iter().map(ProgressEvent::kind).collect();
    let first_arc = kinds.iter().position(|k| *k == "arc_update").unwrap();
    assert!(first_arc < kinds.iter().position(|k| *k == "narrative_event").unwrap());
    let seeded = serde_json::to_value(&frames[first_arc]).unwrap();
    assert_eq!(seeded["update"]["kind"], "phase_advanced");
    assert_eq!(seeded["update"]["phaseName"], "Call");
    let terminal = terminal_json(&frames);
    assert_eq!(terminal["characterArcs"][0]["currentPhase"], 2);
}

#[tokio::test]
async fn test_snapshot_counts_seeded_history_but_storyline_covers_only_the_run() {
    // Arrange
    let generator = Arc::new(ScriptedGenerator::new(|request| {
        let mut output = events_for(request);
        output.events[0].importance = Importance::TurningPoint;
        Ok(output)
    }));
    let h = harness(generator);
    let mut request = common::request(1200, 1200, BatchMode::Speed, &["aria"]);
    let mut backstory = narrative_event("aria", TimelinePoint::year(1190), "Exiled");
    backstory.id = "seed-1".to_owned();
    backstory.importance = Importance::TurningPoint;
    request.events = vec![backstory];

    // Act
    let mut handle = h.runner.start(request).unwrap();
    let frames = drain(&mut handle.progress).await;

    // Assert
    let terminal = terminal_json(&frames);
    assert_eq!(terminal["metrics"]["eventsGenerated"], 1);
    assert_eq!(terminal["characters"][0]["eventCount"], 2);
    assert_eq!(terminal["integratedStoryline"], "Aria in 1200");
}

#[tokio::test]
async fn test_malformed_output_is_retried_then_accepted() {
    let generator = Arc::new(ScriptedGenerator::new(|request| {
        if request.attempt == 1 {
            return Err(GeneratorError::Malformed("truncated json".to_owned()));
        }
        Ok(events_for(request))
    }));
    let h = harness(generator.clone());
    let request = common::request(1200, 1201, BatchMode::Speed, &["aria"]);

    let mut handle = h.runner.start(request).unwrap();
    let frames = drain(&mut handle.progress).await;

    let terminal = terminal_json(&frames);
    assert_eq!(terminal["status"], "completed");
    assert_eq!(terminal["metrics"]["retries"], 2);
    assert_eq!(terminal["metrics"]["generatorCalls"], 4);
    assert_eq!(generator.call_count(), 4);
}

#[tokio::test]
async fn test_persistently_invalid_output_errors_the_run_after_max_attempts() {
    // Arrange
    let generator = Arc::new(ScriptedGenerator::new(|request| {
        let wrong_year = TimelinePoint::year(request.point.year - 50);
        Ok(GenerationOutput {
            events: vec![narrative_event("aria", wrong_year, "Out of time")],
            ..GenerationOutput::default()
        })
    }));
    let h = harness(generator.clone());
    let request = common::request(1200, 1201, BatchMode::Speed, &["aria"]);

    // Act
    let mut handle = h.runner.start(request).unwrap();
    let frames = drain(&mut handle.progress).await;
    let run = handle.task.await.unwrap();

    // Assert
    assert_eq!(generator.call_count(), 3);
    assert_eq!(count(&frames, "narrative_event"), 0);
    let terminal = terminal_json(&frames);
    assert_eq!(terminal["type"], "error");
    assert_eq!(terminal["status"], "errored");
    assert!(terminal["message"].as_str().unwrap().contains("Out of time"));
    assert_eq!(run.status, RunStatus::Errored);
    assert!(run.failure.is_some());
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_rejected_request_errors_without_retry_and_keeps_emitted_state() {
    let h = harness(Arc::new(FailingGenerator(GeneratorError::Rejected {
        status: 400,
        message: "prompt too long".to_owned(),
    })));
    let request = common::request(1200, 1201, BatchMode::Speed, &["aria"]);

    let mut handle = h.runner.start(request).unwrap();
    let frames = drain(&mut handle.progress).await;

    assert_eq!(frames.first().unwrap().kind(), "session_init");
    let terminal = terminal_json(&frames);
    assert_eq!(terminal["type"], "error");
    assert_eq!(terminal["metrics"]["generatorCalls"], 1);
    assert_eq!(terminal["metrics"]["retries"], 0);
    assert!(terminal["characters"].is_array());
    assert_eq!(
        h.history.get(&handle.run_id).unwrap().status,
        RunStatus::Errored
    );
}

#[tokio::test]
async fn test_blank_and_duplicate_event_ids_are_replaced() {
    let generator = Arc::new(ScriptedGenerator::new(|request| {
        let mut blank = narrative_event("aria", request.point, "First");
        blank.id = "  ".to_owned();
        let mut a = narrative_event("aria", request.point, "Second");
        a.id = "dup".to_owned();
        let mut b = narrative_event("aria", request.point, "Third");
        b.id = "dup".to_owned();
        Ok(GenerationOutput {
            events: vec![blank, a, b],
            ..GenerationOutput::default()
        })
    }));
    let h = harness(generator);
    let request = common::request(1200, 1201, BatchMode::Speed, &["aria"]);

    let mut handle = h.runner.start(request).unwrap();
    let frames = drain(&mut handle.progress).await;

    let ids: Vec<String> = frames
        .iter()
        .filter_map(|f| match f {
            ProgressEvent::Narrative { event } => Some(event.id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(ids.len(), 6);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 6);
    assert_eq!(ids.iter().filter(|id| *id == "dup").count(), 1);
    assert!(ids.iter().filter(|id| *id != "dup").all(|id| id.starts_with("evt-")));
}

#[tokio::test]
async fn test_low_theme_alignment_emits_warning_and_parks_until_resumed() {
    // Arrange
    let generator = Arc::new(ScriptedGenerator::new(|request| {
        let mut output = events_for(request);
        output.metrics = vec![CharacterMetrics {
            character_id: "aria".to_owned(),
            theme_alignment: 35,
            interest: 80,
        }];
        Ok(output)
    }));
    let h = harness(generator);
    let request = common::request(1200, 1200, BatchMode::Speed, &["aria"]);

    // Act
    let mut handle = h.runner.start(request).unwrap();
    let before = common::frames_until(&mut handle.progress, |f| {
        matches!(f, ProgressEvent::Status { status: RunStatus::Paused, .. })
    })
    .await;

    // Assert
    let warning = before
        .iter()
        .find_map(|f| match f {
            ProgressEvent::Warning { warning } => Some(warning.clone()),
            _ => None,
        })
        .expect("a warning frame");
    assert_eq!(warning.overall_theme_alignment, 35);
    assert!(matches!(
        before.last(),
        Some(ProgressEvent::Status {
            pause_cause: Some(PauseCause::HealthWarning),
            ..
        })
    ));
    let session = h.registry.get(&handle.session_id).unwrap();
    assert_eq!(session.status(), RunStatus::Paused);
    assert_eq!(session.pause_cause(), Some(PauseCause::HealthWarning));

    // Act
    session.resume();
    let after = drain(&mut handle.progress).await;
    let run = handle.task.await.unwrap();

    // Assert
    assert!(matches!(
        after.first(),
        Some(ProgressEvent::Status {
            status: RunStatus::Running,
            ..
        })
    ));
    assert_eq!(terminal_json(&after)["status"], "completed");
    assert_eq!(run.pause_cause, Some(PauseCause::HealthWarning));
}

#[tokio::test]
async fn test_invalid_request_registers_nothing() {
    let h = harness(Arc::new(ScriptedGenerator::one_event_per_character()));
    let request = common::request(1300, 1200, BatchMode::Speed, &["aria"]);

    let err = h.runner.start(request).unwrap_err();

    assert!(matches!(err, DomainError::Validation(_)));
    assert!(h.registry.is_empty());
    assert!(h.history.list().is_empty());
}
