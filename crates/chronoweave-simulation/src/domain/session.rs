//! Per-run control state.
//!
//! Pause and cancellation are two independent flags, each behind its own
//! `watch` channel, so a control request and the engine never race on a
//! shared compound value. Writers use `send_if_modified`, which makes every
//! operation idempotent.

use std::fmt;
use std::sync::OnceLock;

use chronoweave_core::cancel::CancellationSignal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::run::{PauseCause, RunStatus};

/// Why a session was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// An abort control request.
    UserAbort,
    /// The progress stream's consumer went away.
    ClientDisconnected,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserAbort => f.write_str("aborted by user"),
            Self::ClientDisconnected => f.write_str("client disconnected"),
        }
    }
}

/// Control handle for one in-flight run.
#[derive(Debug)]
pub struct Session {
    id: String,
    pause: watch::Sender<Option<PauseCause>>,
    cancel: watch::Sender<bool>,
    reason: OnceLock<CancelReason>,
}

impl Session {
    /// A running, unpaused session.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let (pause, _) = watch::channel(None);
        let (cancel, _) = watch::channel(false);
        Self {
            id: id.into(),
            pause,
            cancel,
            reason: OnceLock::new(),
        }
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sets the pause flag. The first cause wins while the flag stays set.
    /// Returns `true` if the flag was clear.
    pub fn pause(&self, cause: PauseCause) -> bool {
        self.pause.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(cause);
            true
        })
    }

    /// Clears the pause flag. Returns `true` if it was set.
    pub fn resume(&self) -> bool {
        self.pause.send_if_modified(|current| current.take().is_some())
    }

    /// Why the session is paused, if it is.
    #[must_use]
    pub fn pause_cause(&self) -> Option<PauseCause> {
        *self.pause.borrow()
    }

    /// Returns `true` while the pause flag is set.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.pause_cause().is_some()
    }

    /// Sets the cancellation flag. The first reason is kept. Returns `true`
    /// if the flag was clear.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let _ = self.reason.set(reason);
        self.cancel.send_if_modified(|cancelled| !std::mem::replace(cancelled, true))
    }

    /// Returns `true` once the cancellation flag is set.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Why the session was cancelled, if it was.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.reason.get().copied()
    }

    /// A signal that fires when the session is cancelled.
    #[must_use]
    pub fn cancellation(&self) -> CancellationSignal {
        CancellationSignal::new(self.cancel.subscribe())
    }

    /// Notifications of pause-flag changes.
    #[must_use]
    pub fn pause_changes(&self) -> watch::Receiver<Option<PauseCause>> {
        self.pause.subscribe()
    }

    /// Status as seen from the control surface.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        if self.is_cancelled() {
            RunStatus::Aborted
        } else if self.is_paused() {
            RunStatus::Paused
        } else {
            RunStatus::Running
        }
    }
}
