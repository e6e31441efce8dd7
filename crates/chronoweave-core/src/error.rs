//! Domain error types.

use thiserror::Error;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No active session is registered under the given id.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// No finalized run is recorded under the given id.
    #[error("run not found: {0}")]
    RunNotFound(String),

    /// A session with the given id is already registered.
    #[error("session already exists: {0}")]
    SessionAlreadyExists(String),

    /// One or more required request fields were absent.
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// A control action outside of pause/resume/abort.
    #[error("unknown control action: {0}")]
    UnknownAction(String),

    /// A run was asked to move between states the run lifecycle forbids.
    #[error("invalid run transition from {from} to {to}")]
    InvalidTransition {
        /// The state the run was in.
        from: String,
        /// The requested state.
        to: String,
    },

    /// The narrative generator failed in a way the run could not recover from.
    #[error("narrative generator error: {0}")]
    Generator(String),

    /// An infrastructure error (HTTP client construction, I/O).
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
