//! Delayed re-evaluation after a scene is applied
//!
//! Applying a scene makes every member report a burst of intermediate
//! states. The timer holds evaluation back for `transition + debounce`
//! seconds, and restarting it on each new change means only the last
//! settling window counts.

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, trace};

use crate::host::{ScheduledCall, Scheduler};

struct TimerState {
    transition_time: f64,
    debounce_time: f64,
    pending: Option<ScheduledCall>,
    /// Bumped on every start so a stale fire cannot clear a newer timer
    generation: u64,
}

impl TimerState {
    /// Back to idle without cancelling; only the run that armed `generation` may do it
    fn clear(&mut self, generation: u64) {
        if self.generation == generation {
            self.pending = None;
        }
    }
}

/// At most one pending delayed callback
pub struct EvaluationTimer {
    scheduler: Arc<dyn Scheduler>,
    state: Arc<Mutex<TimerState>>,
}

/// Negative or non-finite durations count as zero
pub(crate) fn sanitize(seconds: f64) -> f64 {
    if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    }
}

impl EvaluationTimer {
    pub fn new(scheduler: Arc<dyn Scheduler>, transition_time: f64, debounce_time: f64) -> Self {
        Self {
            scheduler,
            state: Arc::new(Mutex::new(TimerState {
                transition_time: sanitize(transition_time),
                debounce_time: sanitize(debounce_time),
                pending: None,
                generation: 0,
            })),
        }
    }

    pub fn transition_time(&self) -> f64 {
        self.state.lock().map(|s| s.transition_time).unwrap_or(0.0)
    }

    pub fn debounce_time(&self) -> f64 {
        self.state.lock().map(|s| s.debounce_time).unwrap_or(0.0)
    }

    /// Applies to the next [`start`](Self::start)
    pub fn set_transition_time(&self, seconds: f64) {
        if let Ok(mut state) = self.state.lock() {
            state.transition_time = sanitize(seconds);
        }
    }

    /// Applies to the next [`start`](Self::start)
    pub fn set_debounce_time(&self, seconds: f64) {
        if let Ok(mut state) = self.state.lock() {
            state.debounce_time = sanitize(seconds);
        }
    }

    /// Total wait in seconds
    pub fn window(&self) -> f64 {
        self.state
            .lock()
            .map(|s| s.transition_time + s.debounce_time)
            .unwrap_or(0.0)
    }

    pub fn is_active(&self) -> bool {
        self.state
            .lock()
            .map(|s| s.pending.is_some())
            .unwrap_or(false)
    }

    /// Cancel any pending callback and schedule `callback` after the window
    ///
    /// Returns false, leaving the timer idle, when the window is zero; the
    /// caller is expected to evaluate right away in that case.
    pub fn start(&self, callback: BoxFuture<'static, ()>) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };

        if let Some(pending) = state.pending.take() {
            trace!("Restarting evaluation timer");
            pending.cancel();
        }

        let window = state.transition_time + state.debounce_time;
        if window <= 0.0 {
            return false;
        }

        state.generation += 1;
        let generation = state.generation;
        let shared = Arc::clone(&self.state);

        let fire: BoxFuture<'static, ()> = Box::pin(async move {
            // Back to idle before evaluating, so a change seen during the
            // evaluation is evaluated on its own instead of being dropped
            if let Ok(mut state) = shared.lock() {
                state.clear(generation);
            }
            callback.await;
        });

        debug!(window_secs = window, "Arming evaluation timer");
        state.pending = Some(
            self.scheduler
                .call_later(Duration::from_secs_f64(window), fire),
        );
        true
    }

    /// Restart the window with `callback` only if the timer is armed
    ///
    /// Returns false and leaves an idle timer idle.
    pub fn restart_if_active(&self, callback: BoxFuture<'static, ()>) -> bool {
        if !self.is_active() {
            return false;
        }
        self.start(callback)
    }

    /// Cancel the pending callback, if any; safe to call repeatedly
    pub fn cancel_if_active(&self) {
        let pending = self.state.lock().ok().and_then(|mut s| s.pending.take());
        if let Some(pending) = pending {
            debug!("Cancelling evaluation timer");
            pending.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::TokioScheduler;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn timer(transition: f64, debounce: f64) -> EvaluationTimer {
        EvaluationTimer::new(Arc::new(TokioScheduler), transition, debounce)
    }

    fn counting() -> (Arc<AtomicUsize>, impl Fn() -> BoxFuture<'static, ()>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let make = move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }) as BoxFuture<'static, ()>
        };
        (count, make)
    }

    #[test]
    fn test_settings() {
        let timer = timer(1.0, 0.5);
        assert_eq!(timer.transition_time(), 1.0);
        assert_eq!(timer.debounce_time(), 0.5);
        assert_eq!(timer.window(), 1.5);

        timer.set_transition_time(-3.0);
        timer.set_debounce_time(f64::NAN);
        assert_eq!(timer.window(), 0.0);
        assert!(!timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_window_does_not_arm() {
        let timer = timer(0.0, 0.0);
        let (count, make) = counting();

        assert!(!timer.start(make()));
        assert!(!timer.is_active());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_and_returns_to_idle() {
        let timer = timer(1.0, 0.0);
        let (count, make) = counting();

        assert!(timer.start(make()));
        assert!(timer.is_active());

        tokio::time::sleep(Duration::from_millis(1001)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_keeps_only_last_window() {
        let timer = timer(1.0, 0.5);
        let (count, make) = counting();

        timer.start(make());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        timer.start(make());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(501)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_if_active() {
        let timer = timer(1.0, 0.0);
        let (count, make) = counting();

        timer.cancel_if_active();
        timer.start(make());
        timer.cancel_if_active();
        timer.cancel_if_active();
        assert!(!timer.is_active());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_if_active_leaves_idle_timer_alone() {
        let timer = timer(1.0, 0.5);
        let (count, make) = counting();

        assert!(!timer.restart_if_active(make()));
        assert!(!timer.is_active());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        timer.start(make());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(timer.restart_if_active(make()));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(501)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fire_keeps_newer_timer_armed() {
        let timer = timer(1.0, 0.0);
        let (_count, make) = counting();

        timer.start(make());
        let stale = timer.state.lock().unwrap().generation;
        timer.start(make());

        timer.state.lock().unwrap().clear(stale);
        assert!(timer.is_active());

        let current = timer.state.lock().unwrap().generation;
        timer.state.lock().unwrap().clear(current);
        assert!(!timer.is_active());
    }
}
