//! A cloneable handle for poking the agent from external code.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// A cloneable handle for aborting and observing the agent.
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone)]
pub struct AgentHandle {
    pub(crate) cancel: Arc<Mutex<CancellationToken>>,
    pub(crate) idle_notify: Arc<tokio::sync::Notify>,
    pub(crate) is_running: Arc<AtomicBool>,
}

impl AgentHandle {
    pub(crate) fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            idle_notify: Arc::new(tokio::sync::Notify::new()),
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Abort the current request. The conversation is left as it was
    /// before the aborted turn began.
    pub fn abort(&self) {
        self.cancel.lock().cancel();
    }

    /// Mark a request as started and hand out a fresh cancellation token.
    /// Fails with [`Error::Busy`] while another request is in flight.
    pub(crate) fn begin(&self) -> Result<CancellationToken> {
        if self
            .is_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Busy);
        }
        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();
        Ok(token)
    }

    /// Mark the request as finished and wake idle waiters
    pub(crate) fn finish(&self) {
        self.is_running.store(false, Ordering::Release);
        self.idle_notify.notify_waiters();
    }

    /// Wait until the agent loop becomes idle (finishes running).
    pub async fn wait_for_idle(&self) {
        let notified = self.idle_notify.notified();
        if !self.is_running.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }

    /// Wait until the agent loop becomes idle, with a timeout.
    /// Returns `true` if idle was reached, `false` on timeout.
    pub async fn wait_for_idle_timeout(&self, timeout: std::time::Duration) -> bool {
        if !self.is_running.load(Ordering::Acquire) {
            return true;
        }
        tokio::time::timeout(timeout, self.wait_for_idle())
            .await
            .is_ok()
    }

    /// Whether a request is currently being processed.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_second_begin_is_busy() {
        let handle = AgentHandle::new();
        let _token = handle.begin().unwrap();
        assert!(matches!(handle.begin(), Err(Error::Busy)));
        handle.finish();
        assert!(handle.begin().is_ok());
    }

    #[test]
    fn test_begin_resets_cancellation() {
        let handle = AgentHandle::new();
        handle.abort();
        let token = handle.begin().unwrap();
        assert!(!token.is_cancelled());
        handle.abort();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_for_idle() {
        let handle = AgentHandle::new();
        assert!(handle.wait_for_idle_timeout(Duration::from_millis(10)).await);
        let _token = handle.begin().unwrap();
        assert!(!handle.wait_for_idle_timeout(Duration::from_millis(10)).await);

        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.wait_for_idle().await });
        tokio::task::yield_now().await;
        handle.finish();
        task.await.unwrap();
        assert!(!handle.is_running());
    }
}
