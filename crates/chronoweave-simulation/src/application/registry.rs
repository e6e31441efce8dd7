//! The session registry.
//!
//! An explicit, injected table of in-flight runs keyed by session id. The
//! map lock is held only for the lookup itself; per-session flags live on
//! the `Session`, so operations on different ids never contend beyond that.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chronoweave_core::error::DomainError;
use tracing::debug;

use crate::domain::session::Session;

/// Process-wide table of in-flight sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session under `id`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::SessionAlreadyExists` if `id` is taken.
    pub fn create(&self, id: &str) -> Result<Arc<Session>, DomainError> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(id) {
            return Err(DomainError::SessionAlreadyExists(id.to_owned()));
        }
        let session = Arc::new(Session::new(id));
        sessions.insert(id.to_owned(), Arc::clone(&session));
        debug!(session_id = id, "session registered");
        Ok(session)
    }

    /// Looks up the session registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::SessionNotFound` if no run is in flight under
    /// `id`, whether it never existed or has finished.
    pub fn get(&self, id: &str) -> Result<Arc<Session>, DomainError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| DomainError::SessionNotFound(id.to_owned()))
    }

    /// Removes the session registered under `id`. Absent ids are ignored.
    pub fn delete(&self, id: &str) {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if removed.is_some() {
            debug!(session_id = id, "session removed");
        }
    }

    /// Number of in-flight sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` when no run is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
