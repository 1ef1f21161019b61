//! Repeatedly drives a unit of work at a fixed interval, cancellable mid-sleep. Modeled on the
//! block sealer's `tokio::time::Interval` with `MissedTickBehavior::Delay`, generalized from a
//! `Future`-polling sealer to an explicit start/stop pair since the synchronizer's driving loop
//! needs to be started once at `Synchronizer::start` and stopped again at `Synchronizer::stop`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

struct Running {
    join: JoinHandle<()>,
    stop: Arc<Notify>,
}

/// Calls a closure on a fixed cadence until stopped. `start` is idempotent: calling it while
/// already running is a no-op rather than spawning a second loop.
pub struct PeriodicTicker {
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl PeriodicTicker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: Mutex::new(None),
        }
    }

    /// Spawns the loop: call `f()`, await it, sleep `interval` (unless `stop` fires first),
    /// repeat. A no-op if the ticker is already running.
    pub async fn start<F, Fut>(&self, mut f: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }
        let stop = Arc::new(Notify::new());
        let stop_loop = stop.clone();
        let interval = self.interval;
        let join = tokio::spawn(async move {
            loop {
                f().await;
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop_loop.notified() => break,
                }
            }
        });
        *running = Some(Running { join, stop });
    }

    /// Cancels the current sleep, if any, and waits for the in-flight call to `f` (if any) to
    /// finish before returning. A no-op if the ticker isn't running.
    pub async fn stop(&self) {
        let running = self.running.lock().await.take();
        if let Some(Running { join, stop }) = running {
            stop.notify_one();
            let _ = join.await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}
