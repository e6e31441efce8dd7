//! Shared test doubles for the Chronoweave simulation orchestrator.

mod clock;
mod fixtures;
mod generator;
mod rng;

pub use clock::{FixedClock, ManualClock};
pub use fixtures::{events_for, narrative_event};
pub use generator::{FailingGenerator, GatedGenerator, ScriptedGenerator};
pub use rng::{MockRng, SequenceRng};
