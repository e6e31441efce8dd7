//! Health evaluation.

pub mod monitor;
