//! Chronoweave — Storyline Health Monitor.
//!
//! Evaluates aggregate storyline metrics and decides whether a run must
//! pause for human review. Evaluation is a pure function of its input.

pub mod application;
pub mod domain;
