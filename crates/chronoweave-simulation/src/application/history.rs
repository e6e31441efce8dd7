//! Finalized runs, newest first.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chronoweave_core::error::DomainError;

use crate::domain::run::SimulationRun;

/// Bounded in-memory history of finalized runs.
#[derive(Debug)]
pub struct RunHistory {
    limit: usize,
    runs: Mutex<VecDeque<SimulationRun>>,
}

impl RunHistory {
    /// A history keeping at most `limit` runs.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            runs: Mutex::new(VecDeque::new()),
        }
    }

    /// Records a finalized run, evicting the oldest beyond the limit.
    pub fn record(&self, run: SimulationRun) {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        runs.push_front(run);
        runs.truncate(self.limit);
    }

    /// Every retained run, newest first.
    #[must_use]
    pub fn list(&self) -> Vec<SimulationRun> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// The retained run with id `run_id`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::RunNotFound` if the run is unknown, still in
    /// flight, or has been evicted.
    pub fn get(&self, run_id: &str) -> Result<SimulationRun, DomainError> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|run| run.run_id == run_id)
            .cloned()
            .ok_or_else(|| DomainError::RunNotFound(run_id.to_owned()))
    }
}
