//! Application layer for simulation runs.

pub mod control;
pub mod engine;
pub mod history;
pub mod registry;
pub mod runner;
pub mod stream;
