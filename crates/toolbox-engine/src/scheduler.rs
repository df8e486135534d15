//! Process-wide fixed-interval scheduler driving continuous modules.
//!
//! One interval runs from [`Scheduler::start`] until [`Scheduler::stop`] or
//! [`Scheduler::shutdown`]. The tick callback must not block: it spawns the
//! per-module work and returns, so a slow action never delays the next tick.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Upper bound on waiting for the tick loop to exit during shutdown.
pub const STOP_WAIT_TIMEOUT_MS: u64 = 50;

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Fixed-interval tick loop with cancellation.
#[derive(Clone, Default)]
pub struct Scheduler {
    running: Arc<Mutex<Option<Running>>>,
    ticks: Arc<AtomicU64>,
}

impl Scheduler {
    /// An idle scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ticks delivered since construction.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Start (or restart) the loop, calling `on_tick(n)` every `interval`.
    ///
    /// The first tick fires one interval after start. Missed ticks are
    /// skipped rather than bursted.
    pub fn start<F>(&self, interval: Duration, mut on_tick: F)
    where
        F: FnMut(u64) + Send + 'static,
    {
        self.stop();

        let token = CancellationToken::new();
        let cancel = token.clone();
        let ticks = self.ticks.clone();
        let period = interval.max(Duration::from_millis(1));

        let fut = async move {
            debug!(interval_ms = period.as_millis(), "scheduler_start");
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        trace!("scheduler_cancelled");
                        return;
                    }
                    _ = ticker.tick() => {
                        let n = ticks.fetch_add(1, Ordering::Relaxed) + 1;
                        on_tick(n);
                    }
                }
            }
        };

        let handle = tokio::spawn(fut);
        *self.running.lock() = Some(Running { token, handle });
    }

    /// Cancel the loop without waiting for it to exit.
    pub fn stop(&self) {
        if let Some(running) = self.running.lock().take() {
            running.token.cancel();
            trace!("scheduler_stop");
        }
    }

    /// Cancel the loop and wait briefly for it to exit.
    pub async fn shutdown(&self) {
        let running = self.running.lock().take();
        if let Some(running) = running {
            running.token.cancel();
            if time::timeout(Duration::from_millis(STOP_WAIT_TIMEOUT_MS), running.handle)
                .await
                .is_err()
            {
                debug!("scheduler loop did not exit in time");
            }
            trace!("scheduler_shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_at_fixed_interval() {
        let sched = Scheduler::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        sched.start(Duration::from_millis(100), move |n| s.lock().push(n));

        time::sleep(Duration::from_millis(350)).await;
        assert_eq!(*seen.lock(), vec![1, 2, 3]);

        sched.shutdown().await;
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(sched.ticks(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_loop() {
        let sched = Scheduler::new();
        let a = Arc::new(AtomicU64::new(0));
        let b = Arc::new(AtomicU64::new(0));
        let (ca, cb) = (a.clone(), b.clone());
        sched.start(Duration::from_millis(100), move |_| {
            ca.fetch_add(1, Ordering::Relaxed);
        });
        time::sleep(Duration::from_millis(150)).await;
        sched.start(Duration::from_millis(100), move |_| {
            cb.fetch_add(1, Ordering::Relaxed);
        });
        time::sleep(Duration::from_millis(250)).await;
        sched.stop();
        assert_eq!(a.load(Ordering::Relaxed), 1);
        assert_eq!(b.load(Ordering::Relaxed), 2);
    }
}
