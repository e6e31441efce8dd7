//! Shared application state.

use std::sync::{Arc, Mutex};

use chronoweave_core::clock::Clock;
use chronoweave_core::generator::NarrativeGenerator;
use chronoweave_core::rng::DeterministicRng;
use chronoweave_simulation::application::engine::{EngineSettings, SimulationEngine};
use chronoweave_simulation::application::history::RunHistory;
use chronoweave_simulation::application::registry::SessionRegistry;
use chronoweave_simulation::application::runner::SimulationRunner;

/// Run limits that are not engine tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Progress channel capacity per run.
    pub stream_buffer: usize,
    /// Finalized runs kept in memory.
    pub run_history_limit: usize,
}

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// In-flight sessions, keyed by session id.
    pub registry: Arc<SessionRegistry>,
    /// Finalized runs, newest first.
    pub history: Arc<RunHistory>,
    /// Starts runs.
    pub runner: Arc<SimulationRunner>,
}

impl AppState {
    /// Wires the engine and its collaborators.
    #[must_use]
    pub fn new(
        generator: Arc<dyn NarrativeGenerator>,
        clock: Arc<dyn Clock + Send + Sync>,
        rng: Arc<Mutex<dyn DeterministicRng + Send>>,
        settings: EngineSettings,
        limits: RunLimits,
    ) -> Self {
        let engine = Arc::new(SimulationEngine::new(
            generator,
            Arc::clone(&clock),
            rng,
            settings,
        ));
        let registry = Arc::new(SessionRegistry::new());
        let history = Arc::new(RunHistory::new(limits.run_history_limit));
        let runner = Arc::new(SimulationRunner::new(
            engine,
            Arc::clone(&registry),
            Arc::clone(&history),
            clock,
            limits.stream_buffer,
        ));

        Self {
            registry,
            history,
            runner,
        }
    }
}
