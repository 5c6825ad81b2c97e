use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Single-shot deadline scheduler. A session holds at most one pending
/// deadline at a time (the state machine advances phase by phase), so
/// deadlines are keyed by session id and scheduling a new one replaces
/// the old. Cancellation is idempotent: cancelling a fired, replaced or
/// unknown deadline is a no-op.
///
/// Phase correctness does not rest on cancellation alone — every callback
/// carries the epoch it was scheduled for, and the state machine ignores
/// callbacks whose epoch has passed.
#[derive(Debug, Default)]
pub struct TimerService {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `callback` to run once after `delay`. Must be called from
    /// within a tokio runtime.
    pub fn schedule<F>(&self, key: impl Into<String>, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let key = key.into();
        debug!(key = %key, delay_ms = delay.as_millis() as u64, "deadline scheduled");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        let mut guard = self.tasks.lock().expect("timer lock poisoned");
        if let Some(stale) = guard.insert(key, handle) {
            stale.abort();
        }
    }

    /// Schedule `callback` every `period`, until cancelled. The first run
    /// happens one full period from now.
    pub fn schedule_repeating<F>(&self, key: impl Into<String>, period: Duration, callback: F)
    where
        F: Fn() + Send + 'static,
    {
        let key = key.into();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                callback();
            }
        });
        let mut guard = self.tasks.lock().expect("timer lock poisoned");
        if let Some(stale) = guard.insert(key, handle) {
            stale.abort();
        }
    }

    /// Cancel a pending deadline. No-op if it already fired or never
    /// existed.
    pub fn cancel(&self, key: &str) {
        let mut guard = self.tasks.lock().expect("timer lock poisoned");
        if let Some(handle) = guard.remove(key) {
            handle.abort();
            debug!(key = %key, "deadline cancelled");
        }
    }

    pub fn pending(&self) -> usize {
        let guard = self.tasks.lock().expect("timer lock poisoned");
        guard.values().filter(|h| !h.is_finished()).count()
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        if let Ok(guard) = self.tasks.lock() {
            for handle in guard.values() {
                handle.abort();
            }
        }
    }
}
