//! Route modules.

pub mod control;
pub mod health;
pub mod simulation;
