//! Starts runs: one task per run.

use std::sync::Arc;

use chronoweave_core::clock::Clock;
use chronoweave_core::error::DomainError;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span};
use uuid::Uuid;

use super::engine::SimulationEngine;
use super::history::RunHistory;
use super::registry::SessionRegistry;
use super::stream::{ProgressReceiver, progress_channel};
use crate::domain::config::SimulationRequest;
use crate::domain::progress::ProgressEvent;
use crate::domain::run::SimulationRun;
use crate::domain::session::CancelReason;

/// A started run.
#[derive(Debug)]
pub struct RunHandle {
    /// Id to address control requests to.
    pub session_id: String,
    /// Id of the run record.
    pub run_id: String,
    /// Ordered progress frames. Dropping this cancels the run.
    pub progress: ProgressReceiver,
    /// Resolves to the finalized run record.
    pub task: JoinHandle<SimulationRun>,
}

/// Validates requests and spawns runs.
pub struct SimulationRunner {
    engine: Arc<SimulationEngine>,
    registry: Arc<SessionRegistry>,
    history: Arc<RunHistory>,
    clock: Arc<dyn Clock + Send + Sync>,
    stream_buffer: usize,
}

impl SimulationRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(
        engine: Arc<SimulationEngine>,
        registry: Arc<SessionRegistry>,
        history: Arc<RunHistory>,
        clock: Arc<dyn Clock + Send + Sync>,
        stream_buffer: usize,
    ) -> Self {
        Self {
            engine,
            registry,
            history,
            clock,
            stream_buffer,
        }
    }

    /// Validates `request`, registers a session, and spawns the run.
    ///
    /// The first frame on the returned channel is always `session_init`;
    /// the last is `final_state` or `error`. The session is removed from
    /// the registry before the last frame is sent.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the request is invalid, or
    /// `DomainError::SessionAlreadyExists` on an id collision. Nothing is
    /// registered or spawned in either case.
    pub fn start(&self, request: SimulationRequest) -> Result<RunHandle, DomainError> {
        request.validate()?;

        let session_id = format!("sim-{}", Uuid::new_v4());
        let run_id = format!("run-{}", Uuid::new_v4());
        let session = self.registry.create(&session_id)?;
        let (tx, rx) = progress_channel(self.stream_buffer);
        let started_at = self.clock.now();
        let run = SimulationRun::new(
            run_id.clone(),
            session_id.clone(),
            request.config.clone(),
            started_at,
        );

        let engine = Arc::clone(&self.engine);
        let registry = Arc::clone(&self.registry);
        let history = Arc::clone(&self.history);
        let span = info_span!("simulation_run", session_id = %session_id, run_id = %run_id);
        let init = ProgressEvent::SessionInit {
            session_id: session_id.clone(),
            run_id: run_id.clone(),
            started_at,
        };

        let task = tokio::spawn(
            async move {
                if tx.emit(init).await.is_err() {
                    session.cancel(CancelReason::ClientDisconnected);
                }
                let outcome = engine.run_full_simulation(&session, run, request, &tx).await;
                registry.delete(session.id());
                history.record(outcome.run.clone());
                if tx.emit(outcome.terminal_frame()).await.is_err() {
                    debug!("client gone before the terminal frame");
                }
                outcome.run
            }
            .instrument(span),
        );

        Ok(RunHandle {
            session_id,
            run_id,
            progress: rx,
            task,
        })
    }
}
