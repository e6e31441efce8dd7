//! Health report types.

pub mod warning;
