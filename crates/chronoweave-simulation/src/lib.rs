//! Chronoweave — Simulation orchestration.
//!
//! This crate owns everything with a run's lifetime: the session registry,
//! the simulation engine that drives the timeline, the runner that spawns
//! one task per run, the control surface (pause, resume, abort), the
//! ordered progress channel, and the history of finalized runs.

pub mod application;
pub mod domain;
