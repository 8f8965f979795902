//! Cancellation primitive for the ambient context described in spec.md §5:
//! every timed wait (backoff, DLQ-retry delay, reconnect jitter) must race a
//! cancellation signal rather than sleep blindly. Built on `tokio::sync::watch`
//! rather than pulling in `tokio-util`'s `CancellationToken`, following the
//! same watch-channel shutdown idiom the sibling stream-worker example uses.

use std::time::Duration;

use tokio::sync::watch;

/// Handle held by whoever drives graceful shutdown.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

/// Handle held by supervisors/workers/the retry engine to observe cancellation.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Creates a linked handle/signal pair. Cloning either side is cheap and
/// shares the same underlying flag.
pub fn shutdown_pair() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, ShutdownSignal { rx })
}

impl ShutdownHandle {
    /// Triggers shutdown. Idempotent: calling it more than once is a no-op.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

impl ShutdownSignal {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits out `duration`, returning early if shutdown fires first.
    /// Returns `true` if the full duration elapsed, `false` if cancelled.
    pub async fn sleep_or_cancel(&mut self, duration: Duration) -> bool {
        if self.is_shutdown() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.rx.changed() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_completes_without_cancellation() {
        let (_handle, mut signal) = shutdown_pair();
        let completed = signal.sleep_or_cancel(Duration::from_millis(5)).await;
        assert!(completed);
    }

    #[tokio::test]
    async fn sleep_is_cancelled_by_shutdown() {
        let (handle, mut signal) = shutdown_pair();
        handle.shutdown();
        let completed = signal.sleep_or_cancel(Duration::from_secs(30)).await;
        assert!(!completed);
    }

    #[tokio::test]
    async fn shutdown_mid_sleep_interrupts_it() {
        let (handle, mut signal) = shutdown_pair();
        let mut signal2 = signal.clone();
        let waiter = tokio::spawn(async move { signal2.sleep_or_cancel(Duration::from_secs(30)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.shutdown();
        let completed = waiter.await.unwrap();
        assert!(!completed);
        assert!(signal.is_shutdown());
    }
}
