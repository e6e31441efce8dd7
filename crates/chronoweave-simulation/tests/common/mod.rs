//! Shared helpers for simulation integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chronoweave_core::clock::Clock;
use chronoweave_core::generator::NarrativeGenerator;
use chronoweave_core::rng::DeterministicRng;
use chronoweave_simulation::application::engine::{EngineSettings, RetryPolicy, SimulationEngine};
use chronoweave_simulation::application::history::RunHistory;
use chronoweave_simulation::application::registry::SessionRegistry;
use chronoweave_simulation::application::runner::SimulationRunner;
use chronoweave_simulation::application::stream::ProgressReceiver;
use chronoweave_simulation::domain::config::{
    BatchMode, CharacterSeed, SimulationConfig, SimulationRequest,
};
use chronoweave_simulation::domain::progress::ProgressEvent;
use chronoweave_test_support::{FixedClock, MockRng};

/// Upper bound on any single wait in these tests.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// A runner wired to in-memory collaborators.
pub struct Harness {
    pub registry: Arc<SessionRegistry>,
    pub history: Arc<RunHistory>,
    pub runner: SimulationRunner,
}

/// Engine settings with millisecond-scale waits.
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        health_check_every_years: 1,
        pause_poll_interval: Duration::from_millis(5),
        retry: RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(2),
            max_backoff: Duration::from_millis(8),
        },
        recent_event_window: 24,
    }
}

pub fn harness(generator: Arc<dyn NarrativeGenerator>) -> Harness {
    harness_with(generator, fast_settings(), 64)
}

pub fn harness_with(
    generator: Arc<dyn NarrativeGenerator>,
    settings: EngineSettings,
    stream_buffer: usize,
) -> Harness {
    harness_on(generator, Arc::new(FixedClock::standard()), settings, stream_buffer)
}

pub fn harness_on(
    generator: Arc<dyn NarrativeGenerator>,
    clock: Arc<dyn Clock + Send + Sync>,
    settings: EngineSettings,
    stream_buffer: usize,
) -> Harness {
    let rng: Arc<Mutex<dyn DeterministicRng + Send>> = Arc::new(Mutex::new(MockRng));
    let engine = Arc::new(SimulationEngine::new(generator, Arc::clone(&clock), rng, settings));
    let registry = Arc::new(SessionRegistry::new());
    let history = Arc::new(RunHistory::new(10));
    let runner = SimulationRunner::new(
        engine,
        Arc::clone(&registry),
        Arc::clone(&history),
        clock,
        stream_buffer,
    );
    Harness {
        registry,
        history,
        runner,
    }
}

pub fn seed(id: &str) -> CharacterSeed {
    CharacterSeed {
        id: id.to_owned(),
        name: format!("{}{}", id[..1].to_uppercase(), &id[1..]),
        archetype: Some("wanderer".to_owned()),
        active_from: None,
        active_until: None,
        profile: serde_json::json!({ "origin": "the northern marches" }),
    }
}

pub fn request(start_year: i32, end_year: i32, mode: BatchMode, ids: &[&str]) -> SimulationRequest {
    SimulationRequest {
        config: SimulationConfig {
            start_year,
            end_year,
            batch_mode: mode,
            world_id: Some("world-1".to_owned()),
            character_ids: Vec::new(),
        },
        world: serde_json::json!({ "name": "Vell" }),
        characters: ids.iter().map(|id| seed(id)).collect(),
        character_arcs: Vec::new(),
        master_arc: None,
        events: Vec::new(),
    }
}

/// The next frame, failing the test if none arrives in time.
pub async fn next_frame(rx: &mut ProgressReceiver) -> ProgressEvent {
    tokio::time::timeout(PATIENCE, rx.recv())
        .await
        .expect("timed out waiting for a progress frame")
        .expect("progress channel closed early")
}

/// Frames until one matching `pred`, that frame included.
pub async fn frames_until(
    rx: &mut ProgressReceiver,
    pred: impl Fn(&ProgressEvent) -> bool,
) -> Vec<ProgressEvent> {
    let mut frames = Vec::new();
    loop {
        let frame = next_frame(rx).await;
        let done = pred(&frame);
        frames.push(frame);
        if done {
            return frames;
        }
    }
}

/// Every remaining frame up to channel close.
pub async fn drain(rx: &mut ProgressReceiver) -> Vec<ProgressEvent> {
    let mut frames = Vec::new();
    loop {
        match tokio::time::timeout(PATIENCE, rx.recv()).await {
            Ok(Some(frame)) => frames.push(frame),
            Ok(None) => return frames,
            Err(_) => panic!("timed out draining progress frames"),
        }
    }
}

pub fn count(frames: &[ProgressEvent], kind: &str) -> usize {
    frames.iter().filter(|f| f.kind() == kind).count()
}

/// The terminal frame's JSON.
pub fn terminal_json(frames: &[ProgressEvent]) -> serde_json::Value {
    let last = frames.last().expect("no frames");
    assert!(last.is_terminal(), "last frame was {}", last.kind());
    serde_json::to_value(last).unwrap()
}
