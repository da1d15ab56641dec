//! Owned, cancellable reconnect timer
//!
//! Dropping a [`ReconnectTimer`] aborts the scheduled task, so clearing the
//! manager's pending slot is enough to guarantee the callback never runs.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// A reconnect scheduled to run once after `delay`
#[derive(Debug)]
pub struct ReconnectTimer {
    id: u64,
    attempt: u32,
    delay: Duration,
    handle: Option<JoinHandle<()>>,
}

impl ReconnectTimer {
    /// Spawn the timer on the current Tokio runtime
    pub fn schedule<F>(id: u64, attempt: u32, delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire();
        });

        Self {
            id,
            attempt,
            delay,
            handle: Some(handle),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancel before firing
    pub fn cancel(self) {
        debug!(attempt = self.attempt, "Cancelling scheduled reconnect");
        drop(self);
    }

    /// Release the timer from inside its own callback without aborting it
    pub fn disarm(mut self) {
        self.handle.take();
    }
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
