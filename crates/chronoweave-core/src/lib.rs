//! Chronoweave Core — shared domain abstractions.
//!
//! This crate defines the timeline model, the narrative generator contract,
//! and the determinism seams (clock, RNG, cancellation) that the arc,
//! health, and simulation crates depend on. It contains no infrastructure
//! code.

pub mod cancel;
pub mod clock;
pub mod error;
pub mod event;
pub mod generator;
pub mod rng;
