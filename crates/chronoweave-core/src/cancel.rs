//! Cooperative cancellation.
//!
//! A run's session owns the sending half; every unit of work that may take
//! wall-clock time (generator calls, backoff sleeps, pause waits) receives a
//! `CancellationSignal` and either polls it or races against it.

use tokio::sync::watch;

/// Read side of a session's cancellation flag.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

impl CancellationSignal {
    /// Wraps the receiving half of a cancellation flag.
    #[must_use]
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Returns `true` once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested.
    ///
    /// If the owning session is dropped without cancelling, this never
    /// resolves.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_cancelled_resolves_after_flag_is_set() {
        // Arrange
        let (tx, rx) = watch::channel(false);
        let signal = CancellationSignal::new(rx);
        assert!(!signal.is_cancelled());

        // Act
        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.cancelled().await }
        });
        tx.send_replace(true);

        // Assert
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() should resolve")
            .unwrap();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_never_signal_does_not_resolve() {
        let signal = CancellationSignal::never();

        let outcome = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;

        assert!(outcome.is_err());
        assert!(!signal.is_cancelled());
    }
}
