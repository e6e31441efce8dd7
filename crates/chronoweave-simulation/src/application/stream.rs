//! The ordered progress channel between a run and its consumer.
//!
//! Single writer, single reader, bounded. A full buffer suspends the
//! engine; a dropped receiver is how a disconnected client shows up.

use chronoweave_core::cancel::CancellationSignal;
use tokio::sync::mpsc;

use crate::domain::progress::ProgressEvent;

/// Receiving half of a run's progress channel.
pub type ProgressReceiver = mpsc::Receiver<ProgressEvent>;

/// Why a frame could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitError {
    /// The run was cancelled while the frame waited for buffer space.
    Cancelled,
    /// The consumer is gone.
    Disconnected,
}

/// Sending half of a run's progress channel.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<ProgressEvent>,
}

/// Creates a progress channel holding at most `capacity` undelivered frames.
#[must_use]
pub fn progress_channel(capacity: usize) -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ProgressSender { tx }, rx)
}

impl ProgressSender {
    /// Delivers `event`, waiting for buffer space.
    ///
    /// # Errors
    ///
    /// Returns `EmitError::Disconnected` if the receiver has been dropped.
    pub async fn emit(&self, event: ProgressEvent) -> Result<(), EmitError> {
        self.tx.send(event).await.map_err(|_| EmitError::Disconnected)
    }

    /// Delivers `event` unless `cancel` fires first.
    ///
    /// # Errors
    ///
    /// Returns `EmitError::Cancelled` if the run is cancelled before the
    /// frame is accepted, or `EmitError::Disconnected` if the receiver has
    /// been dropped.
    pub async fn emit_unless_cancelled(
        &self,
        event: ProgressEvent,
        cancel: &CancellationSignal,
    ) -> Result<(), EmitError> {
        if cancel.is_cancelled() {
            return Err(EmitError::Cancelled);
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(EmitError::Cancelled),
            sent = self.tx.send(event) => sent.map_err(|_| EmitError::Disconnected),
        }
    }

    /// Returns `true` once the receiver has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the receiver has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::watch;

    use super::*;
    use crate::domain::run::RunStatus;

    fn frame() -> ProgressEvent {
        ProgressEvent::Status {
            status: RunStatus::Running,
            pause_cause: None,
        }
    }

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (tx, mut rx) = progress_channel(4);

        tx.emit(frame()).await.unwrap();
        tx.emit(ProgressEvent::Status {
            status: RunStatus::Paused,
            pause_cause: None,
        })
        .await
        .unwrap();

        assert_eq!(rx.recv().await.unwrap().kind(), "status");
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second,
            ProgressEvent::Status {
                status: RunStatus::Paused,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dropped_receiver_reports_disconnect() {
        let (tx, rx) = progress_channel(4);
        drop(rx);

        assert!(tx.is_closed());
        assert_eq!(tx.emit(frame()).await, Err(EmitError::Disconnected));
    }

    #[tokio::test]
    async fn test_full_buffer_yields_to_cancellation() {
        // Arrange
        let (tx, _rx) = progress_channel(1);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel = CancellationSignal::new(cancel_rx);
        tx.emit(frame()).await.unwrap();

        // Act
        let blocked = tokio::spawn({
            let tx = tx.clone();
            let cancel = cancel.clone();
            async move { tx.emit_unless_cancelled(frame(), &cancel).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel_tx.send_replace(true);

        // Assert
        let outcome = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, Err(EmitError::Cancelled));
    }
}
