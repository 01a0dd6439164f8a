//! The interruptible wait between the original and the fallback attempt.
//!
//! An interrupted wait is a failed request: the service must not go on to
//! call the provider a second time after its caller gave up. [`TokioWait`]
//! races a tokio timer against a cancellation signal so the caller observes
//! the failure promptly instead of after the full delay.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

/// The wait was cancelled before the delay elapsed.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("wait before fallback was interrupted")]
pub struct WaitInterrupted;

/// Blocks the current request for the fallback delay.
#[async_trait]
pub trait FallbackWait: Send + Sync {
    async fn wait(&self, delay: Duration) -> Result<(), WaitInterrupted>;
}

/// Cancels every wait of the [`TokioWait`] it was created with.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Interrupt in-flight and future waits.
    pub fn cancel(&self) {
        // send_replace succeeds even when no wait is currently listening.
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Timer-based wait, optionally cancellable.
#[derive(Debug, Clone, Default)]
pub struct TokioWait {
    cancel: Option<watch::Receiver<bool>>,
}

impl TokioWait {
    /// A plain timer that can't be interrupted.
    pub fn new() -> Self {
        Self::default()
    }

    /// A wait paired with the handle that interrupts it.
    pub fn cancellable() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, Self { cancel: Some(rx) })
    }
}

#[async_trait]
impl FallbackWait for TokioWait {
    async fn wait(&self, delay: Duration) -> Result<(), WaitInterrupted> {
        let Some(rx) = &self.cancel else {
            tokio::time::sleep(delay).await;
            return Ok(());
        };

        let mut rx = rx.clone();
        if *rx.borrow_and_update() {
            return Err(WaitInterrupted);
        }

        let deadline = tokio::time::Instant::now() + delay;
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => Ok(()),
            cancelled = wait_for_cancel(&mut rx) => {
                if cancelled {
                    debug!("Fallback wait interrupted after cancel signal");
                    Err(WaitInterrupted)
                } else {
                    // Handle dropped without cancelling: finish the wait.
                    tokio::time::sleep_until(deadline).await;
                    Ok(())
                }
            }
        }
    }
}

/// Resolves `true` once cancelled, `false` if the handle was dropped first.
async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) -> bool {
    loop {
        if rx.changed().await.is_err() {
            return false;
        }
        if *rx.borrow_and_update() {
            return true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn plain_wait_completes() {
        let w = TokioWait::new();
        assert_eq!(w.wait(Duration::from_millis(5)).await, Ok(()));
    }

    #[tokio::test]
    async fn cancel_before_wait_fails_immediately() {
        let (handle, w) = TokioWait::cancellable();
        handle.cancel();
        assert!(handle.is_cancelled());
        let start = Instant::now();
        assert_eq!(w.wait(Duration::from_secs(30)).await, Err(WaitInterrupted));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancel_during_wait_fails_promptly() {
        let (handle, w) = TokioWait::cancellable();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });
        let start = Instant::now();
        assert_eq!(w.wait(Duration::from_secs(30)).await, Err(WaitInterrupted));
        assert!(start.elapsed() < Duration::from_secs(5));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_handle_does_not_interrupt() {
        let (handle, w) = TokioWait::cancellable();
        drop(handle);
        assert_eq!(w.wait(Duration::from_millis(5)).await, Ok(()));
    }
}
