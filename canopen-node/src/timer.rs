//! Repeatable period worker (spec section 4.6): start/stop/is_running, a
//! period that is either fixed or re-resolved from the Object Dictionary on
//! every tick, an optional start delay, and steady-rate phase correction.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// The function invoked on every tick. Errors are logged; the loop continues
/// (spec: "Exceptions in the user function are logged; the loop continues").
pub type TickFn = Box<dyn FnMut() -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send>;

/// A named, restartable periodic worker.
pub struct TimerLoop {
    name: String,
    running: Arc<AtomicBool>,
    stop: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for TimerLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerLoop")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

impl TimerLoop {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(Notify::new()),
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the loop. `resolve_period` is called at the head of every cycle
    /// so an OD-backed period picks up SDO writes on the next tick. Does
    /// nothing if already running.
    pub fn start(
        &mut self,
        mut resolve_period: impl FnMut() -> Duration + Send + 'static,
        start_delay: Option<Duration>,
        mut tick: TickFn,
    ) {
        if self.is_running() {
            return;
        }
        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let stop = self.stop.clone();
        let name = self.name.clone();

        self.handle = Some(tokio::spawn(async move {
            if let Some(delay) = start_delay {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stop.notified() => {
                        running.store(false, Ordering::SeqCst);
                        return;
                    }
                }
            }

            let origin = Instant::now();
            loop {
                let period = resolve_period();
                let elapsed = origin.elapsed();
                let remainder = if period.is_zero() {
                    Duration::ZERO
                } else {
                    Duration::from_nanos((elapsed.as_nanos() % period.as_nanos().max(1)) as u64)
                };
                let sleep_for = period.saturating_sub(remainder);

                tokio::select! {
                    _ = tokio::time::sleep(sleep_for) => {}
                    _ = stop.notified() => break,
                }

                if let Err(e) = tick().await {
                    log::warn!("timer loop {name:?} tick failed: {e}");
                }
            }
            running.store(false, Ordering::SeqCst);
        }));
    }

    /// Stop the loop. Safe to call when not running.
    pub fn stop(&mut self) {
        self.stop.notify_waiters();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for TimerLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test(start_paused = true)]
    async fn fixed_period_ticks_repeatedly() {
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let mut timer = TimerLoop::new("test");
        timer.start(
            || Duration::from_millis(10),
            None,
            Box::new(move || {
                let count = count_clone.clone();
                Box::pin(async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        );

        tokio::time::advance(Duration::from_millis(35)).await;
        tokio::task::yield_now().await;
        assert!(count.load(Ordering::SeqCst) >= 3);
        timer.stop();
        assert!(!timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn start_delay_postpones_first_tick() {
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let mut timer = TimerLoop::new("delayed");
        timer.start(
            || Duration::from_millis(10),
            Some(Duration::from_millis(50)),
            Box::new(move || {
                let count = count_clone.clone();
                Box::pin(async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        );

        tokio::time::advance(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        timer.stop();
    }
}
