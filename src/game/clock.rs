//! Round Clock
//!
//! A periodic trigger with no game semantics of its own. The engine driver
//! hands it a callback that enqueues a tick for the current round generation.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Fixed-cadence tick source backed by a tokio task.
///
/// Must be started from inside a tokio runtime.
#[derive(Debug, Default)]
pub struct RoundClock {
    handle: Option<JoinHandle<()>>,
}

impl RoundClock {
    /// Create a stopped clock.
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Invoke `on_tick` every `every` until stopped. The first call happens one
    /// period after start. Restarting a running clock stops the old schedule first.
    ///
    /// Late ticks are delivered in a burst rather than skipped.
    pub fn start<F>(&mut self, every: Duration, mut on_tick: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.stop();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                ticker.tick().await;
                on_tick();
            }
        });

        self.handle = Some(handle);
    }

    /// Stop ticking. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether a schedule is active.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for RoundClock {
    fn drop(&mut self) {
        self.stop();
    }
}
