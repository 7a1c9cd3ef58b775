//! Presence and heartbeat timers.
//!
//! Both are thin wrappers over a spawned tokio task holding a callback. The
//! presence timer is one-shot with a freshly randomized delay on every
//! (re)start; the heartbeat timer is periodic and fires immediately on start.
//! `start`, `reset`, and `stop` are idempotent and safe from any thread.

use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Detects leader silence. While a leader keeps sending AppendEntries the
/// node keeps resetting this timer; if it ever fires, the node assumes the
/// leader is gone and stands for election.
pub struct PresenceTimer {
    min: Duration,
    max: Duration,
    callback: Callback,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceTimer {
    /// The delay for each start is drawn uniformly from `[min, max)`, so
    /// followers that lose the same leader stand for election at different
    /// moments.
    pub fn new(min: Duration, max: Duration, callback: Callback) -> Self {
        Self {
            min,
            max,
            callback,
            handle: Mutex::new(None),
        }
    }

    /// Arm the timer with a fresh random delay, cancelling any pending
    /// expiry. Returns the chosen delay.
    pub fn start(&self) -> Duration {
        let delay = rand::thread_rng().gen_range(self.min..self.max);
        trace!(?delay, "presence timer armed");
        let callback = Arc::clone(&self.callback);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        if let Some(previous) = self.handle.lock().replace(task) {
            previous.abort();
        }
        delay
    }

    /// Push the expiry out again; equivalent to a restart.
    pub fn reset(&self) -> Duration {
        self.start()
    }

    /// Disarm without firing.
    pub fn stop(&self) {
        if let Some(task) = self.handle.lock().take() {
            task.abort();
        }
    }
}

impl Drop for PresenceTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drives the leader's periodic replication. Fires once immediately on start
/// and then every `interval` until stopped.
pub struct HeartbeatTimer {
    interval: Duration,
    callback: Callback,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatTimer {
    pub fn new(interval: Duration, callback: Callback) -> Self {
        Self {
            interval,
            callback,
            handle: Mutex::new(None),
        }
    }

    /// Begin the periodic cycle, replacing any previous one.
    pub fn start(&self) {
        let callback = Arc::clone(&self.callback);
        let interval = self.interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                callback();
            }
        });
        if let Some(previous) = self.handle.lock().replace(task) {
            previous.abort();
        }
    }

    pub fn stop(&self) {
        if let Some(task) = self.handle.lock().take() {
            task.abort();
        }
    }
}

impl Drop for HeartbeatTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
