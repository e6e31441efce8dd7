//! Arc data model and its invariants.

pub mod arc;
pub mod updates;
