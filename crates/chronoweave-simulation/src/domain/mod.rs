//! Domain types for simulation runs.

pub mod config;
pub mod progress;
pub mod run;
pub mod session;
pub mod timeline;
