//! `NarrativeGenerator` doubles.

use std::sync::Mutex;

use async_trait::async_trait;
use chronoweave_core::cancel::CancellationSignal;
use chronoweave_core::generator::{
    GenerationOutput, GenerationRequest, GeneratorError, NarrativeGenerator,
};
use tokio::sync::{Semaphore, watch};

use crate::fixtures::events_for;

type Script = dyn Fn(&GenerationRequest) -> Result<GenerationOutput, GeneratorError> + Send + Sync;

/// A generator that answers every call with a closure and records the
/// requests it received.
pub struct ScriptedGenerator {
    script: Box<Script>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    /// Answers with `script`.
    #[must_use]
    pub fn new(
        script: impl Fn(&GenerationRequest) -> Result<GenerationOutput, GeneratorError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call with one event per requested character.
    #[must_use]
    pub fn one_event_per_character() -> Self {
        Self::new(|request| Ok(events_for(request)))
    }

    /// Returns a snapshot of every request received, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of requests received.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl NarrativeGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
        _cancel: &CancellationSignal,
    ) -> Result<GenerationOutput, GeneratorError> {
        self.calls.lock().unwrap().push(request.clone());
        (self.script)(request)
    }
}

/// A generator that always fails with the configured error.
#[derive(Debug)]
pub struct FailingGenerator(pub GeneratorError);

#[async_trait]
impl NarrativeGenerator for FailingGenerator {
    async fn generate(
        &self,
        _request: &GenerationRequest,
        _cancel: &CancellationSignal,
    ) -> Result<GenerationOutput, GeneratorError> {
        Err(self.0.clone())
    }
}

/// A generator whose calls block until the test releases them. Answers with
/// one event per requested character. Honors cancellation while blocked.
#[derive(Debug)]
pub struct GatedGenerator {
    gate: Semaphore,
    started: watch::Sender<usize>,
    finished: watch::Sender<usize>,
}

impl Default for GatedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl GatedGenerator {
    /// A generator with no calls released.
    #[must_use]
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            started: watch::channel(0).0,
            finished: watch::channel(0).0,
        }
    }

    /// Lets `calls` more calls return.
    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    /// Calls that have been entered, released or not.
    #[must_use]
    pub fn calls_started(&self) -> usize {
        *self.started.borrow()
    }

    /// Calls that have returned a result.
    #[must_use]
    pub fn calls_finished(&self) -> usize {
        *self.finished.borrow()
    }

    /// Waits until at least `calls` calls have been entered.
    pub async fn wait_for_started(&self, calls: usize) {
        let mut rx = self.started.subscribe();
        let _ = rx.wait_for(|started| *started >= calls).await;
    }

    /// Waits until at least `calls` calls have returned a result.
    pub async fn wait_for_finished(&self, calls: usize) {
        let mut rx = self.finished.subscribe();
        let _ = rx.wait_for(|finished| *finished >= calls).await;
    }
}

#[async_trait]
impl NarrativeGenerator for GatedGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationSignal,
    ) -> Result<GenerationOutput, GeneratorError> {
        self.started.send_modify(|started| *started += 1);
        tokio::select! {
            permit = self.gate.acquire() => match permit {
                Ok(permit) => permit.forget(),
                Err(_) => return Err(GeneratorError::Transport("gate closed".to_owned())),
            },
            () = cancel.cancelled() => return Err(GeneratorError::Cancelled),
        }
        self.finished.send_modify(|finished| *finished += 1);
        Ok(events_for(request))
    }
}
