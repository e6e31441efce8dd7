//! Operations applying generator reports to tracked arcs.

pub mod tracker;
