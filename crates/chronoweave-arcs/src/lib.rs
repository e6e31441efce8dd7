//! Chronoweave — Arc Tracker.
//!
//! Maintains per-character and master story-arc progression (phases,
//! required beats, tension, fulfillment) as the narrative generator reports
//! progress. Phases only ever move forward, and only once every required
//! beat of the current phase has been fulfilled.

pub mod application;
pub mod domain;
