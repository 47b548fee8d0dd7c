//! Repeating liveness probe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Handle to a repeating background probe.
///
/// Cancellation is idempotent and does not join the thread: a probe
/// may already be blocked on the engine's tag lock when `cancel` runs
/// under that same lock, so joining here would deadlock. The tick
/// callback receives the cancel token and re-checks it once it holds
/// the lock; the thread itself exits at its next wakeup.
pub(crate) struct LivenessPoller {
    cancelled: Arc<AtomicBool>,
}

impl LivenessPoller {
    /// Spawn a poller firing `tick` every `interval` until cancelled.
    pub(crate) fn spawn<F>(interval: Duration, tick: F) -> Self
    where
        F: Fn(&AtomicBool) + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let token = Arc::clone(&cancelled);
        thread::spawn(move || loop {
            thread::sleep(interval);
            if token.load(Ordering::SeqCst) {
                break;
            }
            tick(&token);
        });
        Self { cancelled }
    }

    /// Stop the poller. Safe to call any number of times.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl Drop for LivenessPoller {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_ticks_until_cancelled() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let poller = LivenessPoller::spawn(Duration::from_millis(5), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(ticks.load(Ordering::SeqCst) >= 2);

        poller.cancel();
        poller.cancel();
        thread::sleep(Duration::from_millis(20));
        let after_cancel = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        // At most one in-flight tick lands after cancellation.
        assert!(ticks.load(Ordering::SeqCst) <= after_cancel + 1);
    }

    #[test]
    fn test_drop_cancels() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        {
            let _poller = LivenessPoller::spawn(Duration::from_millis(5), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            thread::sleep(Duration::from_millis(20));
        }
        thread::sleep(Duration::from_millis(10));
        let after_drop = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert!(ticks.load(Ordering::SeqCst) <= after_drop + 1);
    }
}
